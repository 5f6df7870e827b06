//! Streaming MIME renderer.
//!
//! [`render`] serializes a [`Message`] into an [`AsyncWrite`] as the
//! RFC 5322 + RFC 2045 byte stream used during the SMTP DATA phase.
//! Attachment bodies are pulled through a fixed-size buffer and emitted
//! as 76-column base64 lines, so a multi-gigabyte attachment costs a few
//! kilobytes of memory. Dot-stuffing is deliberately *not* applied here;
//! that belongs to the transport writing the DATA payload.

use crate::address::{parse_address_list, Mailbox};
use crate::encoding::{
    encode_header_value, encode_quoted_printable, is_seven_bit, LINE_WIDTH,
};
use crate::error::Result;
use crate::header::canonical_name;
use crate::message::{Attachment, AttachmentBody, Message};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt::Write as _;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes of attachment input consumed per emitted base64 line.
const BASE64_LINE_INPUT: usize = 57;

/// Attachment read-buffer size; a whole number of base64 line groups.
const CHUNK_SIZE: usize = BASE64_LINE_INPUT * 144;

/// Headers the renderer emits itself, in this order.
const ADDRESS_HEADERS: [&str; 6] = ["from", "reply-to", "sender", "to", "cc", "bcc"];
const MANAGED_HEADERS: [&str; 12] = [
    "from",
    "reply-to",
    "sender",
    "to",
    "cc",
    "bcc",
    "subject",
    "message-id",
    "date",
    "content-type",
    "content-transfer-encoding",
    "mime-version",
];

/// Serializes `message` into `out`.
///
/// `domain` names this host in generated `Message-ID`s. Stream and path
/// attachment bodies are consumed; everything else is left intact.
///
/// # Errors
///
/// Returns an error when reading an attachment or writing to `out`
/// fails.
pub async fn render<W>(message: &mut Message, domain: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let has_attachments = !message.attachments.is_empty();
    let has_alternative = message.alternative.is_some();
    let mixed_boundary = has_attachments.then(new_boundary);
    let alt_boundary = has_alternative.then(new_boundary);

    let mut head = String::new();
    for name in ADDRESS_HEADERS {
        if let Some(value) = message.headers.get(name) {
            push_address_header(&mut head, name, value);
        }
    }
    if let Some(subject) = message.headers.get("subject") {
        push_header(&mut head, "Subject", &encode_header_value(subject));
    }
    let message_id = message.headers.get("message-id").map_or_else(
        || generate_message_id(domain),
        ensure_angle_brackets,
    );
    push_header(&mut head, "Message-ID", &message_id);
    let date = message
        .headers
        .get("date")
        .filter(|value| DateTime::parse_from_rfc2822(value).is_ok())
        .map_or_else(|| Utc::now().to_rfc2822(), ToString::to_string);
    push_header(&mut head, "Date", &date);
    for (name, value) in message.headers.iter() {
        if MANAGED_HEADERS.iter().any(|m| name.eq_ignore_ascii_case(m)) {
            continue;
        }
        push_header(&mut head, &canonical_name(name), &encode_header_value(value));
    }
    push_header(&mut head, "MIME-Version", "1.0");

    if let Some(boundary) = &mixed_boundary {
        push_header(
            &mut head,
            "Content-Type",
            &format!("multipart/mixed; boundary=\"{boundary}\""),
        );
    } else if let Some(boundary) = &alt_boundary {
        push_header(
            &mut head,
            "Content-Type",
            &format!("multipart/alternative; boundary=\"{boundary}\""),
        );
    } else {
        let text = message.text.as_deref().unwrap_or("");
        push_header(&mut head, "Content-Type", &message.content);
        push_header(
            &mut head,
            "Content-Transfer-Encoding",
            text_encoding_name(text),
        );
    }
    head.push_str("\r\n");
    out.write_all(head.as_bytes()).await?;

    if let Some(mixed) = &mixed_boundary {
        if message.text.is_some() || has_alternative {
            out.write_all(format!("--{mixed}\r\n").as_bytes()).await?;
            if let Some(alt) = &alt_boundary {
                write_alternative_node(message, alt, out).await?;
            } else {
                write_text_leaf(message, out).await?;
            }
            out.write_all(b"\r\n").await?;
        }
        let mut attachments = std::mem::take(&mut message.attachments);
        for attachment in &mut attachments {
            out.write_all(format!("--{mixed}\r\n").as_bytes()).await?;
            write_attachment(attachment, out).await?;
            out.write_all(b"\r\n").await?;
        }
        message.attachments = attachments;
        out.write_all(format!("--{mixed}--\r\n").as_bytes()).await?;
    } else if let Some(alt) = &alt_boundary {
        write_alternative_parts(message, alt, out).await?;
    } else {
        let text = message.text.as_deref().unwrap_or("");
        let body = encode_text_body(text);
        out.write_all(body.as_bytes()).await?;
        out.write_all(b"\r\n").await?;
    }
    Ok(())
}

fn text_encoding_name(text: &str) -> &'static str {
    if is_seven_bit(text) {
        "7bit"
    } else {
        "quoted-printable"
    }
}

fn encode_text_body(text: &str) -> String {
    if is_seven_bit(text) {
        normalize_crlf(text)
    } else {
        encode_quoted_printable(text)
    }
}

async fn write_text_leaf<W>(message: &Message, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let text = message.text.as_deref().unwrap_or("");
    let mut head = String::new();
    push_header(&mut head, "Content-Type", &message.content);
    push_header(&mut head, "Content-Transfer-Encoding", text_encoding_name(text));
    head.push_str("\r\n");
    out.write_all(head.as_bytes()).await?;
    out.write_all(encode_text_body(text).as_bytes()).await?;
    Ok(())
}

async fn write_alternative_node<W>(message: &mut Message, boundary: &str, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut head = String::new();
    push_header(
        &mut head,
        "Content-Type",
        &format!("multipart/alternative; boundary=\"{boundary}\""),
    );
    head.push_str("\r\n");
    out.write_all(head.as_bytes()).await?;
    write_alternative_parts(message, boundary, out).await
}

async fn write_alternative_parts<W>(
    message: &mut Message,
    boundary: &str,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if message.text.is_some() {
        out.write_all(format!("--{boundary}\r\n").as_bytes()).await?;
        write_text_leaf(message, out).await?;
        out.write_all(b"\r\n").await?;
    }
    if let Some(alternative) = message.alternative.as_deref_mut() {
        out.write_all(format!("--{boundary}\r\n").as_bytes()).await?;
        write_attachment(alternative, out).await?;
        out.write_all(b"\r\n").await?;
    }
    out.write_all(format!("--{boundary}--\r\n").as_bytes()).await?;
    Ok(())
}

/// Writes one attachment, wrapping it in `multipart/related` when it
/// carries embedded resources.
async fn write_attachment<W>(attachment: &mut Attachment, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if attachment.related.is_empty() {
        return write_leaf(attachment, out).await;
    }
    let boundary = new_boundary();
    let mut head = String::new();
    push_header(
        &mut head,
        "Content-Type",
        &format!("multipart/related; boundary=\"{boundary}\""),
    );
    head.push_str("\r\n");
    out.write_all(head.as_bytes()).await?;

    out.write_all(format!("--{boundary}\r\n").as_bytes()).await?;
    write_leaf(attachment, out).await?;
    let mut related = std::mem::take(&mut attachment.related);
    for resource in &mut related {
        out.write_all(format!("\r\n--{boundary}\r\n").as_bytes()).await?;
        write_leaf(resource, out).await?;
    }
    attachment.related = related;
    out.write_all(format!("\r\n--{boundary}--\r\n").as_bytes()).await?;
    Ok(())
}

async fn write_leaf<W>(attachment: &mut Attachment, out: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let qp_text = !attachment.encoded
        && attachment.content_type.starts_with("text/")
        && matches!(attachment.body, AttachmentBody::Data(_));

    let mut content_type = attachment.content_type.clone();
    if let Some(charset) = &attachment.charset {
        let _ = write!(content_type, "; charset={charset}");
    }
    if let Some(method) = &attachment.method {
        let _ = write!(content_type, "; method={method}");
    }
    if let Some(name) = &attachment.name {
        let _ = write!(content_type, "; name=\"{name}\"");
    }

    let mut head = String::new();
    push_header(&mut head, "Content-Type", &content_type);
    push_header(
        &mut head,
        "Content-Transfer-Encoding",
        if qp_text { "quoted-printable" } else { "base64" },
    );
    let mut disposition = if attachment.inline { "inline" } else { "attachment" }.to_string();
    if let Some(name) = &attachment.name {
        let _ = write!(disposition, "; filename=\"{name}\"");
    }
    push_header(&mut head, "Content-Disposition", &disposition);
    if let Some(content_id) = &attachment.content_id {
        push_header(&mut head, "Content-ID", &format!("<{content_id}>"));
    }
    head.push_str("\r\n");
    out.write_all(head.as_bytes()).await?;

    match &mut attachment.body {
        AttachmentBody::Data(data) => {
            if attachment.encoded {
                out.write_all(data).await?;
            } else if qp_text {
                let text = String::from_utf8_lossy(data);
                out.write_all(encode_quoted_printable(&text).as_bytes()).await?;
            } else {
                let mut reader: &[u8] = data.as_slice();
                write_base64_body(&mut reader, out).await?;
            }
        }
        AttachmentBody::Stream(reader) => {
            if attachment.encoded {
                copy_verbatim(reader.as_mut(), out).await?;
            } else {
                write_base64_body(reader.as_mut(), out).await?;
            }
        }
        AttachmentBody::Path(path) => {
            let mut file = tokio::fs::File::open(path.as_path()).await?;
            if attachment.encoded {
                copy_verbatim(&mut file, out).await?;
            } else {
                write_base64_body(&mut file, out).await?;
            }
        }
    }
    Ok(())
}

/// Streams a reader into 76-column base64 lines.
async fn write_base64_body<R, W>(reader: &mut R, out: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut pending: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + BASE64_LINE_INPUT);
    let mut line = String::with_capacity(LINE_WIDTH + 2);
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        let mut offset = 0;
        while pending.len() - offset >= BASE64_LINE_INPUT {
            line.clear();
            STANDARD.encode_string(&pending[offset..offset + BASE64_LINE_INPUT], &mut line);
            line.push_str("\r\n");
            out.write_all(line.as_bytes()).await?;
            offset += BASE64_LINE_INPUT;
        }
        pending.drain(..offset);
    }
    if !pending.is_empty() {
        line.clear();
        STANDARD.encode_string(&pending, &mut line);
        line.push_str("\r\n");
        out.write_all(line.as_bytes()).await?;
    }
    Ok(())
}

async fn copy_verbatim<R, W>(reader: &mut R, out: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buf[..n]).await?;
    }
}

fn push_address_header(buf: &mut String, name: &str, value: &str) {
    let mailboxes = parse_address_list(value);
    if mailboxes.is_empty() {
        return;
    }
    let rendered: Vec<String> = mailboxes.iter().map(Mailbox::to_header).collect();
    push_header(buf, &canonical_name(name), &rendered.join(",\r\n\t"));
}

/// Appends `Name: value` to `buf`, folding so no emitted line exceeds
/// [`LINE_WIDTH`] characters before its CRLF.
fn push_header(buf: &mut String, name: &str, value: &str) {
    let full = format!("{name}: {value}");
    for (i, segment) in full.split("\r\n").enumerate() {
        if i > 0 {
            buf.push_str("\r\n");
        }
        push_folded(buf, segment);
    }
    buf.push_str("\r\n");
}

fn push_folded(buf: &mut String, segment: &str) {
    if segment.len() <= LINE_WIDTH {
        buf.push_str(segment);
        return;
    }
    let mut col = 0;
    for (i, word) in segment.split(' ').enumerate() {
        if col > 0 && col + word.len() + 1 > LINE_WIDTH {
            buf.push_str("\r\n\t");
            buf.push_str(word);
            col = 1 + word.len();
        } else {
            if i > 0 {
                buf.push(' ');
                col += 1;
            }
            buf.push_str(word);
            col += word.len();
        }
    }
}

fn normalize_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        out.push_str(line.strip_suffix('\r').unwrap_or(line));
    }
    out
}

fn ensure_angle_brackets(id: &str) -> String {
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}

fn generate_message_id(domain: &str) -> String {
    let millis = u128::from(Utc::now().timestamp_millis().unsigned_abs());
    let noise = u128::from(rand::thread_rng().gen::<u64>());
    format!("<{}.{}@{domain}>", to_base36(millis), to_base36(noise))
}

fn new_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

fn to_base36(mut n: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
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
    fn base36_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1295), "zz");
    }

    #[test]
    fn message_id_shape() {
        let id = generate_message_id("example.com");
        assert!(id.starts_with('<'));
        assert!(id.ends_with("@example.com>"));
        assert!(id.contains('.'));
    }

    #[test]
    fn angle_brackets_added_once() {
        assert_eq!(ensure_angle_brackets("a@b"), "<a@b>");
        assert_eq!(ensure_angle_brackets("<a@b>"), "<a@b>");
    }

    #[test]
    fn boundaries_are_fresh() {
        let a = new_boundary();
        let b = new_boundary();
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }

    #[test]
    fn folding_keeps_lines_short() {
        let mut buf = String::new();
        let value = "word ".repeat(40);
        push_header(&mut buf, "Subject", value.trim());
        for line in buf.split("\r\n") {
            assert!(line.len() <= LINE_WIDTH, "line too long: {line:?}");
        }
    }

    #[test]
    fn normalize_line_endings() {
        assert_eq!(normalize_crlf("a\nb\r\nc"), "a\r\nb\r\nc");
    }
}
