//! In-memory email representation.

use crate::address::{parse_address_list, Mailbox};
use crate::error::ValidationError;
use crate::header::Headers;
use std::fmt;
use std::path::PathBuf;
use tokio::io::AsyncRead;

/// Default content type for the primary body.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Reader type accepted for stream-backed attachments.
pub type AttachmentReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Where an attachment's bytes come from.
///
/// Stream and path bodies are consumed during rendering and may not be
/// reused across sends.
pub enum AttachmentBody {
    /// In-memory buffer.
    Data(Vec<u8>),
    /// Caller-supplied reader, consumed once.
    Stream(AttachmentReader),
    /// Filesystem path, opened at render time.
    Path(PathBuf),
}

impl fmt::Debug for AttachmentBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
        }
    }
}

/// A single MIME part attached to a message.
#[derive(Debug)]
pub struct Attachment {
    /// Byte source.
    pub body: AttachmentBody,
    /// MIME type of the part.
    pub content_type: String,
    /// Filename advertised in the part headers.
    pub name: Option<String>,
    /// Optional `charset=` parameter.
    pub charset: Option<String>,
    /// Optional `method=` parameter (calendar invites and the like).
    pub method: Option<String>,
    /// Bytes are already transfer-encoded; emit them verbatim.
    pub encoded: bool,
    /// Marks the alternative rendering of the text body.
    pub alternative: bool,
    /// Render with `Content-Disposition: inline`.
    pub inline: bool,
    /// `Content-ID` for parts referenced from related content.
    pub content_id: Option<String>,
    /// Resources embedded alongside this part (`multipart/related`).
    pub related: Vec<Attachment>,
}

impl Attachment {
    fn with_body(body: AttachmentBody) -> Self {
        Self {
            body,
            content_type: "application/octet-stream".to_string(),
            name: None,
            charset: None,
            method: None,
            encoded: false,
            alternative: false,
            inline: false,
            content_id: None,
            related: Vec::new(),
        }
    }

    /// Attachment backed by an in-memory buffer.
    #[must_use]
    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self::with_body(AttachmentBody::Data(data.into()))
    }

    /// Attachment backed by an async reader, consumed once at render.
    #[must_use]
    pub fn stream(reader: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self::with_body(AttachmentBody::Stream(Box::new(reader)))
    }

    /// Attachment backed by a filesystem path, opened at render.
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::with_body(AttachmentBody::Path(path.into()))
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Sets the advertised filename.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the `charset=` parameter.
    #[must_use]
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the `method=` parameter.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Marks the bytes as already transfer-encoded.
    #[must_use]
    pub const fn encoded(mut self, encoded: bool) -> Self {
        self.encoded = encoded;
        self
    }

    /// Marks this part as the alternative rendering of the text body.
    #[must_use]
    pub const fn alternative(mut self, alternative: bool) -> Self {
        self.alternative = alternative;
        self
    }

    /// Renders with an inline disposition.
    #[must_use]
    pub const fn inline(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    /// Sets the `Content-ID` (without angle brackets).
    #[must_use]
    pub fn content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    /// Embeds a related resource rendered under `multipart/related`.
    #[must_use]
    pub fn related(mut self, attachment: Attachment) -> Self {
        self.related.push(attachment);
        self
    }
}

/// An email under construction.
///
/// Headers are supplied by the caller; `Date`, `Message-ID`, and
/// `MIME-Version` are filled in at render time when absent.
#[derive(Debug)]
pub struct Message {
    /// Ordered header collection.
    pub headers: Headers,
    /// Content type of the primary text body.
    pub content: String,
    /// Primary plain-text body.
    pub text: Option<String>,
    /// Alternative rendering (typically `text/html`), forming
    /// `multipart/alternative` together with `text`.
    pub alternative: Option<Box<Attachment>>,
    /// Ordered attachment list.
    pub attachments: Vec<Attachment>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Creates an empty message with the default text content type.
    #[must_use]
    pub fn new() -> Self {
        Self {
            headers: Headers::new(),
            content: DEFAULT_CONTENT_TYPE.to_string(),
            text: None,
            alternative: None,
            attachments: Vec::new(),
        }
    }

    /// Sets a header (replacing an existing value of the same name).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Sets the primary text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Overrides the content type of the primary body.
    #[must_use]
    pub fn content(mut self, content_type: impl Into<String>) -> Self {
        self.content = content_type.into();
        self
    }

    /// Sets an HTML alternative for the text body.
    #[must_use]
    pub fn alternative(mut self, html: impl Into<String>) -> Self {
        self.alternative = Some(Box::new(
            Attachment::data(html.into().into_bytes())
                .content_type("text/html; charset=utf-8")
                .alternative(true),
        ));
        self
    }

    /// Adds an attachment.
    ///
    /// An attachment flagged [`Attachment::alternative`] is normalised
    /// into the alternative slot instead of the attachment list.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        if attachment.alternative {
            self.alternative = Some(Box::new(attachment));
        } else {
            self.attachments.push(attachment);
        }
        self
    }

    /// Validates the headers required for submission.
    ///
    /// Idempotent and non-mutating.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingFrom`] when `from` is absent or yields
    /// no usable address; [`ValidationError::MissingRecipients`] when
    /// none of `to`, `cc`, `bcc` yields one.
    pub fn check_validity(&self) -> Result<(), ValidationError> {
        let from_ok = self
            .headers
            .get("from")
            .map(parse_address_list)
            .is_some_and(|list| list.iter().any(Mailbox::is_valid));
        if !from_ok {
            return Err(ValidationError::MissingFrom);
        }

        let has_recipient = ["to", "cc", "bcc"].iter().any(|name| {
            self.headers
                .get(name)
                .map(parse_address_list)
                .is_some_and(|list| list.iter().any(Mailbox::is_valid))
        });
        if !has_recipient {
            return Err(ValidationError::MissingRecipients);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn missing_from() {
        let message = Message::new().header("to", "b@x.com");
        assert_eq!(
            message.check_validity(),
            Err(ValidationError::MissingFrom)
        );
        assert_eq!(
            ValidationError::MissingFrom.to_string(),
            "Message must have a `from` header"
        );
    }

    #[test]
    fn missing_recipients() {
        let message = Message::new().header("from", "a@x.com");
        assert_eq!(
            message.check_validity(),
            Err(ValidationError::MissingRecipients)
        );
        assert_eq!(
            ValidationError::MissingRecipients.to_string(),
            "Message must have at least one `to`, `cc`, or `bcc` header"
        );
    }

    #[test]
    fn unparseable_from_is_missing() {
        let message = Message::new()
            .header("from", "not an address")
            .header("to", "b@x.com");
        assert_eq!(
            message.check_validity(),
            Err(ValidationError::MissingFrom)
        );
    }

    #[test]
    fn cc_only_is_valid() {
        let message = Message::new()
            .header("from", "a@x.com")
            .header("cc", "b@x.com");
        assert!(message.check_validity().is_ok());
    }

    #[test]
    fn validity_is_idempotent() {
        let message = Message::new()
            .header("from", "a@x.com")
            .header("to", "b@x.com");
        assert_eq!(message.check_validity(), message.check_validity());
    }

    #[test]
    fn alternative_flag_is_normalised() {
        let message = Message::new().attach(
            Attachment::data(b"<p>hi</p>".to_vec())
                .content_type("text/html")
                .alternative(true),
        );
        assert!(message.alternative.is_some());
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn attachment_builder() {
        let attachment = Attachment::data(b"x".to_vec())
            .content_type("text/csv")
            .name("data.csv")
            .charset("utf-8")
            .inline(true)
            .content_id("part1");
        assert_eq!(attachment.content_type, "text/csv");
        assert_eq!(attachment.name.as_deref(), Some("data.csv"));
        assert!(attachment.inline);
        assert_eq!(attachment.content_id.as_deref(), Some("part1"));
    }
}
