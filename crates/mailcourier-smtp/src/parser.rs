//! SMTP reply parsing.
//!
//! Replies are one or more lines of `NNN-text` (continuation) or
//! `NNN text` / bare `NNN` (final). The command engine accumulates
//! lines until [`is_final_line`] and hands the batch to [`parse_reply`].

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Whether a wire line terminates its reply.
///
/// A line terminates the reply when the separator after the code is a
/// space, or when the line is nothing but the code.
#[must_use]
pub fn is_final_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        // Malformed; treat as final so a garbage reply cannot wedge the
        // read loop. parse_reply reports the damage.
        return true;
    }
    bytes.len() == 3 || bytes[3] == b' '
}

/// Parses accumulated reply lines into a [`Reply`].
///
/// The status code is taken from the first line; every line contributes
/// its text with code and separator stripped.
///
/// # Errors
///
/// Returns [`Error::BadResponse`] with code 0 when the reply is
/// malformed (short line, non-numeric code).
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let first = lines
        .first()
        .ok_or_else(|| Error::bad_response("", 0, "empty reply".to_string()))?;
    if first.len() < 3 {
        return Err(Error::bad_response(
            "",
            0,
            format!("reply too short: {first:?}"),
        ));
    }
    let code: u16 = first[..3]
        .parse()
        .map_err(|_| Error::bad_response("", 0, format!("invalid reply code: {first:?}")))?;

    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if line.len() > 4 {
            text.push(line[4..].to_string());
        } else {
            text.push(String::new());
        }
    }
    Ok(Reply::new(ReplyCode::new(code), text))
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
    fn single_line() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn multi_line() {
        let reply = parse_reply(&lines(&[
            "250-mail.example.com",
            "250-STARTTLS",
            "250 8BITMIME",
        ]))
        .unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines.len(), 3);
        assert_eq!(reply.lines[1], "STARTTLS");
    }

    #[test]
    fn bare_code() {
        let reply = parse_reply(&lines(&["354"])).unwrap();
        assert_eq!(reply.code.as_u16(), 354);
        assert_eq!(reply.lines, vec![""]);
    }

    #[test]
    fn final_line_detection() {
        assert!(is_final_line("250 OK"));
        assert!(is_final_line("250"));
        assert!(!is_final_line("250-continues"));
        // Malformed lines must not wedge the accumulator.
        assert!(is_final_line("oops"));
        assert!(is_final_line(""));
    }

    #[test]
    fn malformed_replies_error() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["25"])).is_err());
        assert!(parse_reply(&lines(&["ABC no"])).is_err());
    }
}
