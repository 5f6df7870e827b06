//! # mailcourier-smtp
//!
//! An SMTP submission client (RFC 5321) for delivering mail to a relay
//! over plain TCP, implicit TLS, or STARTTLS.
//!
//! ## Features
//!
//! - **Connection engine**: greeting, EHLO/HELO negotiation with
//!   capability discovery, STARTTLS upgrade, timeout-guarded
//!   command/reply dialogue
//! - **Authentication**: CRAM-MD5, LOGIN, PLAIN, XOAUTH2
//! - **Sequential mailer**: per-client FIFO queue, at most one message
//!   in flight, one-shot greylist retry, idle connection recovery
//! - **Streaming DATA phase**: messages render straight onto the socket
//!   through a dot-stuffing writer; attachments are never buffered whole
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailcourier_mime::Message;
//! use mailcourier_smtp::{ConnectionOptions, Mailer, Security};
//!
//! let options = ConnectionOptions::builder("mail.example.com")
//!     .security(Security::StartTls)
//!     .user("alice")
//!     .password("hunter2")
//!     .build()?;
//! let mailer = Mailer::new(options)?;
//!
//! let message = Message::new()
//!     .header("from", "alice@example.com")
//!     .header("to", "bob@example.com")
//!     .header("subject", "hello")
//!     .text("Hi Bob!");
//!
//! let message = mailer.send(message).await?;
//! ```
//!
//! ## Connection states
//!
//! ```text
//! NotConnected → Connecting → Connected → [Authorizing] → Authorized
//!                                                     ↑        │
//!                                                     └ Data ← Sending
//! ```
//!
//! Any state falls back to `NotConnected` on fatal socket error,
//! timeout, or close.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod command;
pub mod connection;
mod envelope;
mod error;
mod mailer;
pub mod parser;
pub mod types;

pub use connection::{
    Connection, ConnectionOptions, ConnectionOptionsBuilder, Security, State, DEFAULT_TIMEOUT,
};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use mailer::{Delivery, Mailer};
pub use types::{AuthMechanism, Extensions, Reply, ReplyCode};
