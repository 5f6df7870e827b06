//! SMTP command builder.

use crate::types::AuthMechanism;

/// An SMTP client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO - extended greeting.
    Ehlo {
        /// Client hostname.
        domain: String,
    },
    /// HELO - legacy greeting.
    Helo {
        /// Client hostname.
        domain: String,
    },
    /// STARTTLS - request TLS upgrade.
    StartTls,
    /// AUTH - begin an authentication exchange.
    Auth {
        /// Mechanism to use.
        mechanism: AuthMechanism,
        /// Initial response (SASL-IR), already base64.
        initial: Option<String>,
    },
    /// A bare continuation line within an AUTH exchange.
    AuthResponse {
        /// Payload, already base64 (may be empty).
        payload: String,
    },
    /// MAIL FROM - open a transaction.
    MailFrom {
        /// Envelope sender.
        from: String,
    },
    /// RCPT TO - add a recipient.
    RcptTo {
        /// Envelope recipient.
        to: String,
    },
    /// DATA - begin message content.
    Data,
    /// RSET - abort the current transaction.
    Rset,
    /// NOOP - keepalive.
    Noop,
    /// QUIT - close the session.
    Quit,
}

impl Command {
    /// The verb used in error reporting.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo { .. } => "EHLO",
            Self::Helo { .. } => "HELO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Serializes the command as one CRLF-terminated wire line.
    #[must_use]
    pub fn serialize(&self) -> String {
        let mut line = match self {
            Self::Ehlo { domain } => format!("EHLO {domain}"),
            Self::Helo { domain } => format!("HELO {domain}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth { mechanism, initial } => match initial {
                Some(initial) => format!("AUTH {mechanism} {initial}"),
                None => format!("AUTH {mechanism}"),
            },
            Self::AuthResponse { payload } => payload.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        line.push_str("\r\n");
        line
    }

    /// Loggable rendering; credential-bearing payloads are masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth { mechanism, .. } => format!("AUTH {mechanism} ***"),
            Self::AuthResponse { .. } => "***".to_string(),
            _ => {
                let line = self.serialize();
                line.trim_end().to_string()
            }
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
    fn ehlo() {
        let cmd = Command::Ehlo {
            domain: "client.example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), "EHLO client.example.com\r\n");
        assert_eq!(cmd.verb(), "EHLO");
    }

    #[test]
    fn mail_from() {
        let cmd = Command::MailFrom {
            from: "sender@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), "MAIL FROM:<sender@example.com>\r\n");
        assert_eq!(cmd.verb(), "MAIL");
    }

    #[test]
    fn rcpt_to() {
        let cmd = Command::RcptTo {
            to: "rcpt@example.com".to_string(),
        };
        assert_eq!(cmd.serialize(), "RCPT TO:<rcpt@example.com>\r\n");
        assert_eq!(cmd.verb(), "RCPT");
    }

    #[test]
    fn auth_with_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), "AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
    }

    #[test]
    fn auth_without_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial: None,
        };
        assert_eq!(cmd.serialize(), "AUTH LOGIN\r\n");
    }

    #[test]
    fn auth_continuation() {
        let cmd = Command::AuthResponse {
            payload: "dXNlcg==".to_string(),
        };
        assert_eq!(cmd.serialize(), "dXNlcg==\r\n");
        assert_eq!(cmd.verb(), "AUTH");
    }

    #[test]
    fn empty_continuation() {
        let cmd = Command::AuthResponse {
            payload: String::new(),
        };
        assert_eq!(cmd.serialize(), "\r\n");
    }

    #[test]
    fn bare_commands() {
        assert_eq!(Command::Data.serialize(), "DATA\r\n");
        assert_eq!(Command::Rset.serialize(), "RSET\r\n");
        assert_eq!(Command::Noop.serialize(), "NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), "QUIT\r\n");
        assert_eq!(Command::StartTls.serialize(), "STARTTLS\r\n");
    }

    #[test]
    fn redaction_masks_credentials() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial: Some("c2VjcmV0".to_string()),
        };
        assert!(!cmd.redacted().contains("c2VjcmV0"));
        assert_eq!(
            Command::AuthResponse {
                payload: "c2VjcmV0".to_string()
            }
            .redacted(),
            "***"
        );
    }
}
