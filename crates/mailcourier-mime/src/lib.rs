//! # mailcourier-mime
//!
//! In-memory email representation and streaming MIME serialization.
//!
//! This crate owns everything that happens before the first SMTP command:
//!
//! - **Address parsing**: RFC 5322 address-list strings become
//!   [`Mailbox`] values (display name + address), honouring quoted
//!   names, group syntax, and comments.
//! - **Message model**: [`Message`] holds ordered headers, a plain-text
//!   body, an optional alternative rendering, and [`Attachment`]s backed
//!   by buffers, readers, or filesystem paths.
//! - **Rendering**: [`render`](render::render) serializes a message into
//!   any [`tokio::io::AsyncWrite`] as an RFC 5322 + RFC 2045 byte stream,
//!   streaming attachments in bounded chunks so large mail never has to
//!   be materialized in memory.
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcourier_mime::{Attachment, Message};
//!
//! let mut message = Message::new()
//!     .header("from", "Alice <alice@example.com>")
//!     .header("to", "bob@example.com")
//!     .header("subject", "Quarterly report")
//!     .text("Report attached.")
//!     .attach(
//!         Attachment::path("/tmp/report.pdf")
//!             .content_type("application/pdf")
//!             .name("report.pdf"),
//!     );
//!
//! message.check_validity()?;
//!
//! let mut out = Vec::new();
//! mailcourier_mime::render::render(&mut message, "example.com", &mut out).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod encoding;
mod error;
pub mod header;
pub mod message;
pub mod render;

pub use address::{parse_address_list, Mailbox};
pub use error::{Error, Result, ValidationError};
pub use header::Headers;
pub use message::{Attachment, AttachmentBody, Message};
