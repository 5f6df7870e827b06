//! Per-send envelope derivation.

use mailcourier_mime::{parse_address_list, Mailbox, Message, ValidationError};

/// The SMTP envelope for one send: sender, deduplicated recipients, and
/// return path. Distinct from the message's `From:`/`To:` headers, which
/// travel inside DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `MAIL FROM` address.
    pub from: String,
    /// `RCPT TO` addresses: the union of `to`, `cc`, and `bcc`, in
    /// first-occurrence order, each address at most once.
    pub recipients: Vec<String>,
    /// Bounce address; the sender unless overridden upstream.
    pub return_path: String,
}

impl Envelope {
    /// Derives the envelope from a message's headers.
    ///
    /// Pure: the message is not modified.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingFrom`] when `from` yields no usable
    /// address, [`ValidationError::MissingRecipients`] when the
    /// recipient union is empty.
    pub fn from_message(message: &Message) -> Result<Self, ValidationError> {
        let from = message
            .headers
            .get("from")
            .map(parse_address_list)
            .and_then(|list| list.into_iter().find(|m| m.is_valid()))
            .map(|m| m.address)
            .ok_or(ValidationError::MissingFrom)?;

        let mut recipients: Vec<String> = Vec::new();
        for name in ["to", "cc", "bcc"] {
            let Some(value) = message.headers.get(name) else {
                continue;
            };
            for mailbox in parse_address_list(value) {
                if Mailbox::is_valid(&mailbox) && !recipients.contains(&mailbox.address) {
                    recipients.push(mailbox.address);
                }
            }
        }
        if recipients.is_empty() {
            return Err(ValidationError::MissingRecipients);
        }

        Ok(Self {
            return_path: from.clone(),
            from,
            recipients,
        })
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
    fn basic_envelope() {
        let message = Message::new()
            .header("from", "Alice <a@x.com>")
            .header("to", "b@x.com");
        let envelope = Envelope::from_message(&message).unwrap();
        assert_eq!(envelope.from, "a@x.com");
        assert_eq!(envelope.recipients, vec!["b@x.com"]);
        assert_eq!(envelope.return_path, "a@x.com");
    }

    #[test]
    fn duplicate_recipient_counted_once() {
        let message = Message::new()
            .header("from", "a@x.com")
            .header("to", "b@x.com")
            .header("cc", "b@x.com")
            .header("bcc", "b@x.com");
        let envelope = Envelope::from_message(&message).unwrap();
        assert_eq!(envelope.recipients, vec!["b@x.com"]);
    }

    #[test]
    fn first_occurrence_order_wins() {
        let message = Message::new()
            .header("from", "a@x.com")
            .header("to", "b@x.com, c@x.com")
            .header("cc", "d@x.com, b@x.com")
            .header("bcc", "c@x.com, e@x.com");
        let envelope = Envelope::from_message(&message).unwrap();
        assert_eq!(
            envelope.recipients,
            vec!["b@x.com", "c@x.com", "d@x.com", "e@x.com"]
        );
    }

    #[test]
    fn invalid_recipients_skipped() {
        let message = Message::new()
            .header("from", "a@x.com")
            .header("to", "junk, b@x.com");
        let envelope = Envelope::from_message(&message).unwrap();
        assert_eq!(envelope.recipients, vec!["b@x.com"]);
    }

    #[test]
    fn missing_from() {
        let message = Message::new().header("to", "b@x.com");
        assert_eq!(
            Envelope::from_message(&message),
            Err(ValidationError::MissingFrom)
        );
    }

    #[test]
    fn no_recipients() {
        let message = Message::new().header("from", "a@x.com").header("to", "junk");
        assert_eq!(
            Envelope::from_message(&message),
            Err(ValidationError::MissingRecipients)
        );
    }
}
