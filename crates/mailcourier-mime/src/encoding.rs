//! Transfer encodings and RFC 2047 encoded-words.
//!
//! Body text is either passed through as 7-bit or encoded as
//! quoted-printable; binary attachment data is base64. Header values
//! carrying non-ASCII are rendered as Q-encoded words.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::Write as _;

/// Maximum content width of an emitted line, excluding CRLF.
pub const LINE_WIDTH: usize = 76;

/// Maximum length of a single RFC 2047 encoded-word.
pub const ENCODED_WORD_WIDTH: usize = 75;

/// Longest line a 7-bit body may carry (RFC 5321 text line limit).
const SEVEN_BIT_LINE_LIMIT: usize = 998;

/// Encodes bytes as unwrapped base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Whether text may travel as `7bit`: strictly ASCII, no NUL, and no
/// line longer than 998 bytes.
#[must_use]
pub fn is_seven_bit(text: &str) -> bool {
    if !text.is_ascii() || text.bytes().any(|b| b == 0) {
        return false;
    }
    text.split('\n')
        .all(|line| line.len() <= SEVEN_BIT_LINE_LIMIT)
}

/// Whether a header value can be emitted verbatim.
#[must_use]
pub fn is_ascii_printable(text: &str) -> bool {
    text.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}

/// Encodes text as quoted-printable (RFC 2045 §6.7).
///
/// Line structure is preserved: input lines are re-terminated with CRLF
/// and soft-wrapped with `=` breaks so no output line exceeds
/// [`LINE_WIDTH`] characters.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        let bytes = line.as_bytes();
        let mut col = 0;
        for (j, &b) in bytes.iter().enumerate() {
            let last = j + 1 == bytes.len();
            // Trailing whitespace must be encoded so it survives transport.
            let literal = matches!(b, b'!'..=b'<' | b'>'..=b'~')
                || ((b == b' ' || b == b'\t') && !last);
            let width = if literal { 1 } else { 3 };
            if col + width > LINE_WIDTH - 1 {
                out.push_str("=\r\n");
                col = 0;
            }
            if literal {
                out.push(b as char);
            } else {
                out.push('=');
                let _ = write!(out, "{b:02X}");
            }
            col += width;
        }
    }
    out
}

/// Encodes a header value, producing Q-encoded words when needed.
///
/// ASCII-clean values come back unchanged. Otherwise the value is split
/// into `=?UTF-8?Q?…?=` words, each at most [`ENCODED_WORD_WIDTH`]
/// characters, joined by single spaces (adjacent encoded-words collapse
/// on decode, so interior whitespace is carried inside the words).
#[must_use]
pub fn encode_header_value(value: &str) -> String {
    if is_ascii_printable(value) {
        return value.to_string();
    }

    // "=?UTF-8?Q?" + payload + "?="
    let capacity = ENCODED_WORD_WIDTH - 12;
    let mut words: Vec<String> = Vec::new();
    let mut payload = String::new();
    let mut used = 0;

    for c in value.chars() {
        let mut piece = String::new();
        q_encode_char(c, &mut piece);
        if used + piece.len() > capacity && !payload.is_empty() {
            words.push(format!("=?UTF-8?Q?{payload}?="));
            payload.clear();
            used = 0;
        }
        used += piece.len();
        payload.push_str(&piece);
    }
    if !payload.is_empty() {
        words.push(format!("=?UTF-8?Q?{payload}?="));
    }
    words.join(" ")
}

fn q_encode_char(c: char, out: &mut String) {
    if c == ' ' {
        out.push('_');
        return;
    }
    if c.is_ascii_alphanumeric() || matches!(c, '!' | '*' | '+' | '-' | '/') {
        out.push(c);
        return;
    }
    let mut buf = [0u8; 4];
    for b in c.encode_utf8(&mut buf).bytes() {
        let _ = write!(out, "={b:02X}");
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
    fn seven_bit_plain_ascii() {
        assert!(is_seven_bit("hello\nworld"));
    }

    #[test]
    fn seven_bit_rejects_non_ascii() {
        assert!(!is_seven_bit("caf\u{e9}"));
    }

    #[test]
    fn seven_bit_rejects_long_lines() {
        let long = "x".repeat(999);
        assert!(!is_seven_bit(&long));
        let ok = "x".repeat(998);
        assert!(is_seven_bit(&ok));
    }

    #[test]
    fn qp_passthrough() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn qp_encodes_non_ascii() {
        assert_eq!(encode_quoted_printable("caf\u{e9}"), "caf=C3=A9");
    }

    #[test]
    fn qp_preserves_line_structure() {
        assert_eq!(encode_quoted_printable("a\nb\r\nc"), "a\r\nb\r\nc");
    }

    #[test]
    fn qp_encodes_trailing_space() {
        assert_eq!(encode_quoted_printable("end "), "end=20");
        assert_eq!(encode_quoted_printable("a \nb"), "a=20\r\nb");
    }

    #[test]
    fn qp_soft_wraps_long_lines() {
        let encoded = encode_quoted_printable(&"x".repeat(200));
        for line in encoded.split("\r\n") {
            assert!(line.len() <= LINE_WIDTH, "line too long: {}", line.len());
        }
        assert_eq!(encoded.replace("=\r\n", ""), "x".repeat(200));
    }

    #[test]
    fn header_value_ascii_untouched() {
        assert_eq!(encode_header_value("plain subject"), "plain subject");
    }

    #[test]
    fn header_value_q_encoded() {
        let encoded = encode_header_value("caf\u{e9} au lait");
        assert!(encoded.starts_with("=?UTF-8?Q?"), "{encoded}");
        assert!(encoded.ends_with("?="));
        assert!(encoded.contains("caf=C3=A9_au_lait"));
    }

    #[test]
    fn header_value_words_within_limit() {
        let long = "\u{e9}".repeat(80);
        let encoded = encode_header_value(&long);
        for word in encoded.split(' ') {
            assert!(word.len() <= ENCODED_WORD_WIDTH, "{}", word.len());
            assert!(word.starts_with("=?UTF-8?Q?"));
            assert!(word.ends_with("?="));
        }
        assert!(encoded.split(' ').count() > 1);
    }

    #[test]
    fn base64_helper() {
        assert_eq!(encode_base64(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
    }
}
