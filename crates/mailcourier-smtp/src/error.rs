//! Error types for SMTP operations.

use mailcourier_mime::ValidationError;
use std::io;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
///
/// Every failure mode of a send surfaces as exactly one of these through
/// the delivery result; a completed delivery is never resolved twice.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket-level failure. The connection is destroyed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS negotiation failure (implicit TLS or STARTTLS).
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// No reply within the configured window. The connection is
    /// destroyed.
    #[error("timeout")]
    Timeout,

    /// The server answered with a code outside the expected set.
    #[error("bad response on command '{command}': {message}")]
    BadResponse {
        /// Reply code the server returned.
        code: u16,
        /// Server reply text.
        message: String,
        /// Verb of the command that drew the reply.
        command: &'static str,
    },

    /// Authentication failed or no usable mechanism exists. Fatal to
    /// the send and the connection.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A required capability is missing from the server.
    #[error("server does not support {0}")]
    NotSupported(&'static str),

    /// The message failed validation before any command was sent.
    #[error(transparent)]
    InvalidMessage(#[from] ValidationError),

    /// Constructor-time misuse.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client was closed while this send was queued or in flight.
    #[error("client closed")]
    Closed,
}

impl Error {
    pub(crate) fn bad_response(command: &'static str, code: u16, message: String) -> Self {
        Self::BadResponse {
            code,
            message,
            command,
        }
    }

    /// Whether this is a transient (4xx) server rejection.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::BadResponse { code, .. } if *code >= 400 && *code < 500)
    }

    /// Whether this is a permanent (5xx) server rejection.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::BadResponse { code, .. } if *code >= 500 && *code < 600)
    }
}

impl From<mailcourier_mime::Error> for Error {
    fn from(err: mailcourier_mime::Error) -> Self {
        match err {
            mailcourier_mime::Error::Io(io) => Self::Io(io),
            mailcourier_mime::Error::Invalid(validation) => Self::InvalidMessage(validation),
        }
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
    fn bad_response_display() {
        let err = Error::bad_response("RCPT", 450, "greylist".to_string());
        assert_eq!(err.to_string(), "bad response on command 'RCPT': greylist");
    }

    #[test]
    fn transient_classification() {
        let transient = Error::bad_response("RCPT", 450, "busy".to_string());
        assert!(transient.is_transient());
        assert!(!transient.is_permanent());

        let permanent = Error::bad_response("MAIL", 550, "no".to_string());
        assert!(permanent.is_permanent());
        assert!(!Error::Timeout.is_transient());
    }

    #[test]
    fn timeout_display() {
        assert_eq!(Error::Timeout.to_string(), "timeout");
    }

    #[test]
    fn validation_error_passes_through() {
        let err: Error = ValidationError::MissingFrom.into();
        assert_eq!(err.to_string(), "Message must have a `from` header");
    }
}
