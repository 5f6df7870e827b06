//! Core SMTP types: replies and capability discovery.

mod extension;
mod reply;

pub use extension::{AuthMechanism, Extensions};
pub use reply::{Reply, ReplyCode};
