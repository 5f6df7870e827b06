//! Error types for message assembly and rendering.

use std::io;

/// Result type alias for MIME operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling or rendering a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error while streaming an attachment or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The message failed pre-send validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Validation failures with a fixed message catalogue.
///
/// The messages are part of the public contract; callers match on them
/// in user-facing error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No usable sender address.
    #[error("Message must have a `from` header")]
    MissingFrom,

    /// No usable recipient address in any of `to`, `cc`, `bcc`.
    #[error("Message must have at least one `to`, `cc`, or `bcc` header")]
    MissingRecipients,
}
