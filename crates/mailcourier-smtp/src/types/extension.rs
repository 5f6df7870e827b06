//! EHLO capability discovery.

/// Capabilities advertised in an EHLO response.
///
/// Extension keywords are matched once, here; the rest of the crate
/// consults this struct rather than re-scanning reply text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    /// Server accepts STARTTLS.
    pub starttls: bool,
    /// Advertised SASL mechanisms, in server order.
    pub auth: Vec<AuthMechanism>,
    /// Advertised maximum message size, when given with a value.
    pub max_size: Option<usize>,
    /// 8BITMIME supported.
    pub eight_bit_mime: bool,
    /// Command pipelining supported.
    pub pipelining: bool,
}

impl Extensions {
    /// Parses the extension lines of an EHLO reply (greeting line
    /// already stripped).
    #[must_use]
    pub fn parse(lines: &[String]) -> Self {
        let mut extensions = Self::default();
        for line in lines {
            extensions.apply(line);
        }
        extensions
    }

    fn apply(&mut self, line: &str) {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return;
        };
        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => self.starttls = true,
            "AUTH" => {
                self.auth = parts.filter_map(AuthMechanism::parse).collect();
            }
            "SIZE" => self.max_size = parts.next().and_then(|s| s.parse().ok()),
            "8BITMIME" => self.eight_bit_mime = true,
            "PIPELINING" => self.pipelining = true,
            _ => {}
        }
    }

    /// Whether the server advertised a given mechanism.
    #[must_use]
    pub fn supports_mechanism(&self, mechanism: AuthMechanism) -> bool {
        self.auth.contains(&mechanism)
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// CRAM-MD5 challenge-response (RFC 2195).
    CramMd5,
    /// LOGIN two-step plaintext.
    Login,
    /// PLAIN single-step plaintext (RFC 4616).
    Plain,
    /// `XOAUTH2` bearer-token mechanism.
    XOAuth2,
}

impl AuthMechanism {
    /// Client preference order: strongest challenge-response first,
    /// bearer token last.
    pub const PREFERENCE: [Self; 4] = [Self::CramMd5, Self::Login, Self::Plain, Self::XOAuth2];

    /// Parses a mechanism token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "CRAM-MD5" => Some(Self::CramMd5),
            "LOGIN" => Some(Self::Login),
            "PLAIN" => Some(Self::Plain),
            "XOAUTH2" => Some(Self::XOAuth2),
            _ => None,
        }
    }

    /// The wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CramMd5 => "CRAM-MD5",
            Self::Login => "LOGIN",
            Self::Plain => "PLAIN",
            Self::XOAuth2 => "XOAUTH2",
        }
    }
}

impl std::fmt::Display for AuthMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
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

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parse_typical_ehlo() {
        let extensions = Extensions::parse(&lines(&[
            "PIPELINING",
            "SIZE 35882577",
            "STARTTLS",
            "AUTH LOGIN PLAIN CRAM-MD5",
            "8BITMIME",
        ]));
        assert!(extensions.starttls);
        assert!(extensions.pipelining);
        assert!(extensions.eight_bit_mime);
        assert_eq!(extensions.max_size, Some(35882577));
        assert_eq!(
            extensions.auth,
            vec![
                AuthMechanism::Login,
                AuthMechanism::Plain,
                AuthMechanism::CramMd5
            ]
        );
    }

    #[test]
    fn parse_is_case_insensitive() {
        let extensions = Extensions::parse(&lines(&["starttls", "auth plain xoauth2"]));
        assert!(extensions.starttls);
        assert!(extensions.supports_mechanism(AuthMechanism::Plain));
        assert!(extensions.supports_mechanism(AuthMechanism::XOAuth2));
    }

    #[test]
    fn size_without_value() {
        let extensions = Extensions::parse(&lines(&["SIZE"]));
        assert_eq!(extensions.max_size, None);
    }

    #[test]
    fn unknown_extensions_ignored() {
        let extensions = Extensions::parse(&lines(&["DSN", "CHUNKING", "VRFY"]));
        assert_eq!(extensions, Extensions::default());
    }

    #[test]
    fn unknown_mechanisms_skipped() {
        let extensions = Extensions::parse(&lines(&["AUTH DIGEST-MD5 PLAIN GSSAPI"]));
        assert_eq!(extensions.auth, vec![AuthMechanism::Plain]);
    }

    #[test]
    fn mechanism_tokens() {
        for mechanism in AuthMechanism::PREFERENCE {
            assert_eq!(AuthMechanism::parse(mechanism.as_str()), Some(mechanism));
        }
        assert_eq!(AuthMechanism::parse("NTLM"), None);
    }
}
