//! RFC 5322 address-list parsing.
//!
//! The parser is deliberately forgiving: real-world `To:` lines contain
//! every kind of damage, and a submission client is better off extracting
//! what it can than refusing the whole message. Malformed input yields a
//! best-effort parse; consumers treat any entry whose address lacks an
//! `@` as invalid.

use crate::encoding;

/// A parsed mailbox: optional display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, with quoting and escapes removed.
    pub name: Option<String>,
    /// Address specification (`local@domain`), not further validated.
    pub address: String,
}

impl Mailbox {
    /// Creates a mailbox with just an address.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Creates a mailbox with a display name.
    #[must_use]
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Whether this mailbox is usable as an envelope recipient.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let at = self.address.find('@');
        matches!(at, Some(i) if i > 0 && i + 1 < self.address.len())
    }

    /// Renders the mailbox for an address-valued header.
    ///
    /// Display names containing non-ASCII are emitted as RFC 2047
    /// encoded-words; names containing specials are quoted.
    #[must_use]
    pub fn to_header(&self) -> String {
        match &self.name {
            None => self.address.clone(),
            Some(name) if name.is_empty() => self.address.clone(),
            Some(name) => {
                let rendered = if encoding::is_ascii_printable(name) {
                    if name.chars().any(is_special) {
                        quote_display_name(name)
                    } else {
                        name.clone()
                    }
                } else {
                    encoding::encode_header_value(name)
                };
                format!("{rendered} <{}>", self.address)
            }
        }
    }
}

/// Characters that force a display name into a quoted-string.
const fn is_special(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '@' | '\\' | ',' | '.' | '"'
    )
}

fn quote_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Splits an RFC 5322 address-list into mailboxes.
///
/// Handles quoted display names (`"Last, First" <a@b>`), angle-bracketed
/// addresses, commas outside quoted regions, group syntax
/// (`Team: a@b, c@d;` yields the members, not the group name), and
/// strips parenthesized comments. Never fails; unparseable fragments
/// come back as name-less mailboxes that fail [`Mailbox::is_valid`].
#[must_use]
pub fn parse_address_list(input: &str) -> Vec<Mailbox> {
    let mut out = Vec::new();
    let mut token = String::new();
    let mut chars = input.chars();
    let mut in_quote = false;
    let mut comment_depth: u32 = 0;

    while let Some(c) = chars.next() {
        if comment_depth > 0 {
            match c {
                '\\' => {
                    chars.next();
                }
                '(' => comment_depth += 1,
                ')' => comment_depth -= 1,
                _ => {}
            }
            continue;
        }
        match c {
            '\\' if in_quote => {
                token.push(c);
                if let Some(escaped) = chars.next() {
                    token.push(escaped);
                }
            }
            '"' => {
                in_quote = !in_quote;
                token.push('"');
            }
            '(' if !in_quote => comment_depth = 1,
            ',' | ';' if !in_quote => {
                flush(&mut token, &mut out);
            }
            // A colon outside a quoted string introduces a group; the
            // group display name is dropped and the members parse as
            // ordinary list entries up to the closing semicolon.
            ':' if !in_quote && !token.contains('<') && !token.contains('@') => {
                token.clear();
            }
            _ => token.push(c),
        }
    }
    flush(&mut token, &mut out);
    out
}

fn flush(token: &mut String, out: &mut Vec<Mailbox>) {
    let trimmed = token.trim();
    if !trimmed.is_empty() {
        if let Some(mailbox) = parse_mailbox(trimmed) {
            out.push(mailbox);
        }
    }
    token.clear();
}

fn parse_mailbox(entry: &str) -> Option<Mailbox> {
    if let Some(open) = find_unquoted(entry, '<') {
        let rest = &entry[open + 1..];
        let close = rest.find('>').unwrap_or(rest.len());
        let address = rest[..close].trim().to_string();
        let name = unquote(entry[..open].trim());
        return Some(Mailbox {
            name: if name.is_empty() { None } else { Some(name) },
            address,
        });
    }
    Some(Mailbox::new(entry))
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quote = false;
    let mut prev_backslash = false;
    for (i, c) in s.char_indices() {
        if prev_backslash {
            prev_backslash = false;
            continue;
        }
        match c {
            '\\' => prev_backslash = true,
            '"' => in_quote = !in_quote,
            _ if c == needle && !in_quote => return Some(i),
            _ => {}
        }
    }
    None
}

fn unquote(s: &str) -> String {
    let inner = s
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
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
    fn bare_address() {
        let parsed = parse_address_list("alice@example.com");
        assert_eq!(parsed, vec![Mailbox::new("alice@example.com")]);
    }

    #[test]
    fn multiple_addresses() {
        let parsed = parse_address_list("a@x.com, b@x.com , c@x.com");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[1].address, "b@x.com");
    }

    #[test]
    fn display_name_with_brackets() {
        let parsed = parse_address_list("Alice Example <alice@example.com>");
        assert_eq!(
            parsed,
            vec![Mailbox::with_name("Alice Example", "alice@example.com")]
        );
    }

    #[test]
    fn quoted_name_with_comma() {
        let parsed = parse_address_list(r#""Example, Alice" <alice@example.com>, bob@example.com"#);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name.as_deref(), Some("Example, Alice"));
        assert_eq!(parsed[0].address, "alice@example.com");
        assert_eq!(parsed[1].address, "bob@example.com");
    }

    #[test]
    fn escaped_quote_inside_name() {
        let parsed = parse_address_list(r#""say \"hi\"" <a@b.com>"#);
        assert_eq!(parsed[0].name.as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn group_syntax_yields_members() {
        let parsed = parse_address_list("Team: a@x.com, b@x.com;, c@x.com");
        let addresses: Vec<&str> = parsed.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn empty_group() {
        let parsed = parse_address_list("Undisclosed recipients:;");
        assert!(parsed.is_empty());
    }

    #[test]
    fn comments_are_stripped() {
        let parsed = parse_address_list("alice@example.com (work (primary))");
        assert_eq!(parsed, vec![Mailbox::new("alice@example.com")]);
    }

    #[test]
    fn malformed_input_is_best_effort() {
        let parsed = parse_address_list("not-an-address, b@x.com");
        assert_eq!(parsed.len(), 2);
        assert!(!parsed[0].is_valid());
        assert!(parsed[1].is_valid());
    }

    #[test]
    fn validity() {
        assert!(Mailbox::new("a@b").is_valid());
        assert!(!Mailbox::new("ab").is_valid());
        assert!(!Mailbox::new("@b").is_valid());
        assert!(!Mailbox::new("a@").is_valid());
    }

    #[test]
    fn to_header_plain_name() {
        let mailbox = Mailbox::with_name("Alice", "a@b.com");
        assert_eq!(mailbox.to_header(), "Alice <a@b.com>");
    }

    #[test]
    fn to_header_quotes_specials() {
        let mailbox = Mailbox::with_name("Example, Alice", "a@b.com");
        assert_eq!(mailbox.to_header(), r#""Example, Alice" <a@b.com>"#);
    }

    #[test]
    fn to_header_encodes_non_ascii() {
        let mailbox = Mailbox::with_name("Ren\u{e9}e", "r@b.com");
        let rendered = mailbox.to_header();
        assert!(rendered.starts_with("=?UTF-8?Q?"), "{rendered}");
        assert!(rendered.ends_with("<r@b.com>"));
    }

    #[test]
    fn to_header_bare() {
        assert_eq!(Mailbox::new("a@b.com").to_header(), "a@b.com");
    }
}
