//! Full-message rendering assertions.

#![allow(clippy::unwrap_used)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use mailcourier_mime::render::render;
use mailcourier_mime::{Attachment, Message};

async fn render_to_string(message: &mut Message) -> String {
    let mut out = Vec::new();
    render(message, "test.local", &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

fn header_line<'a>(rendered: &'a str, name: &str) -> &'a str {
    rendered
        .split("\r\n")
        .find(|line| line.starts_with(name))
        .unwrap_or_else(|| panic!("missing header {name}"))
}

fn header_offset(rendered: &str, name: &str) -> usize {
    rendered
        .find(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
}

/// Wire-format base64 of `data`: 57-byte input groups, CRLF separated.
fn base64_lines(data: &[u8]) -> String {
    data.chunks(57)
        .map(|chunk| STANDARD.encode(chunk))
        .collect::<Vec<_>>()
        .join("\r\n")
}

#[tokio::test]
async fn plain_text_message() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("subject", "greetings")
        .text("hi");
    let rendered = render_to_string(&mut message).await;

    let (head, body) = rendered.split_once("\r\n\r\n").unwrap();
    assert!(head.contains("From: a@x.com"));
    assert!(head.contains("To: b@x.com"));
    assert!(head.contains("Subject: greetings"));
    assert!(head.contains("Content-Type: text/plain; charset=utf-8"));
    assert!(head.contains("Content-Transfer-Encoding: 7bit"));
    assert_eq!(body, "hi\r\n");
}

#[tokio::test]
async fn header_emission_order() {
    let mut message = Message::new()
        .header("x-custom", "value")
        .header("subject", "s")
        .header("cc", "c@x.com")
        .header("to", "b@x.com")
        .header("from", "a@x.com")
        .text("body");
    let rendered = render_to_string(&mut message).await;

    let from = header_offset(&rendered, "From:");
    let to = header_offset(&rendered, "To:");
    let cc = header_offset(&rendered, "Cc:");
    let subject = header_offset(&rendered, "Subject:");
    let message_id = header_offset(&rendered, "Message-ID:");
    let date = header_offset(&rendered, "Date:");
    let custom = header_offset(&rendered, "X-Custom:");
    let mime_version = header_offset(&rendered, "MIME-Version:");

    assert!(from < to && to < cc && cc < subject);
    assert!(subject < message_id && message_id < date);
    assert!(date < custom && custom < mime_version);
}

#[tokio::test]
async fn generated_date_and_message_id() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("hi");
    let rendered = render_to_string(&mut message).await;

    let id_line = header_line(&rendered, "Message-ID: ");
    let id = id_line.trim_start_matches("Message-ID: ");
    assert!(id.starts_with('<') && id.ends_with('>') && id.contains('@'), "{id}");
    assert!(id.ends_with("@test.local>"));

    let date_line = header_line(&rendered, "Date: ");
    let date = date_line.trim_start_matches("Date: ");
    assert!(chrono::DateTime::parse_from_rfc2822(date).is_ok(), "{date}");
}

#[tokio::test]
async fn supplied_message_id_gets_brackets() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("message-id", "custom.id@else.where")
        .text("hi");
    let rendered = render_to_string(&mut message).await;
    assert!(rendered.contains("Message-ID: <custom.id@else.where>"));
}

#[tokio::test]
async fn invalid_date_is_replaced() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("date", "yesterday-ish")
        .text("hi");
    let rendered = render_to_string(&mut message).await;
    let date = header_line(&rendered, "Date: ").trim_start_matches("Date: ");
    assert!(chrono::DateTime::parse_from_rfc2822(date).is_ok());
}

#[tokio::test]
async fn unicode_subject_is_q_encoded() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("subject", "caf\u{e9} menu \u{2615}")
        .text("hi");
    let rendered = render_to_string(&mut message).await;

    let (head, _) = rendered.split_once("\r\n\r\n").unwrap();
    assert!(head.contains("Subject: =?UTF-8?Q?"), "{head}");
    assert!(head.is_ascii(), "headers must be ASCII-clean");
}

#[tokio::test]
async fn display_names_survive_rendering() {
    let mut message = Message::new()
        .header("from", r#""Example, Alice" <a@x.com>"#)
        .header("to", "Bob <b@x.com>, c@x.com")
        .text("hi");
    let rendered = render_to_string(&mut message).await;
    assert!(rendered.contains(r#"From: "Example, Alice" <a@x.com>"#));
    assert!(rendered.contains("Bob <b@x.com>"));
}

#[tokio::test]
async fn non_ascii_body_is_quoted_printable() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("caf\u{e9} au lait");
    let rendered = render_to_string(&mut message).await;
    assert!(rendered.contains("Content-Transfer-Encoding: quoted-printable"));
    assert!(rendered.contains("caf=C3=A9 au lait"));
}

#[tokio::test]
async fn alternative_builds_multipart_alternative() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("plain")
        .alternative("<p>rich</p>");
    let rendered = render_to_string(&mut message).await;

    assert!(rendered.contains("Content-Type: multipart/alternative; boundary="));
    let plain = rendered.find("text/plain").unwrap();
    let html = rendered.find("text/html").unwrap();
    assert!(plain < html, "text part must precede the alternative");
    assert!(rendered.contains("<p>rich</p>"));
    assert!(rendered.trim_end().ends_with("--"));
}

#[tokio::test]
async fn attachments_build_multipart_mixed() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("see attachment")
        .alternative("<p>see attachment</p>")
        .attach(
            Attachment::data(b"col1,col2\n1,2\n".to_vec())
                .content_type("text/csv")
                .name("data.csv"),
        );
    let rendered = render_to_string(&mut message).await;

    let mixed = rendered.find("multipart/mixed").unwrap();
    let alternative = rendered.find("multipart/alternative").unwrap();
    assert!(mixed < alternative, "alternative nests inside mixed");
    assert!(rendered.contains("Content-Disposition: attachment; filename=\"data.csv\""));

    // Distinct boundaries per nesting level.
    let mixed_boundary = boundary_after(&rendered, mixed);
    let alt_boundary = boundary_after(&rendered, alternative);
    assert_ne!(mixed_boundary, alt_boundary);
}

fn boundary_after(rendered: &str, from: usize) -> &str {
    let rest = &rendered[from..];
    let start = rest.find("boundary=\"").unwrap() + "boundary=\"".len();
    let end = rest[start..].find('"').unwrap();
    &rest[start..start + end]
}

#[tokio::test]
async fn related_resources_get_content_ids() {
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("plain")
        .attach(
            Attachment::data(b"<img src=\"cid:logo\">".to_vec())
                .content_type("text/html")
                .related(
                    Attachment::data(vec![0x89, b'P', b'N', b'G'])
                        .content_type("image/png")
                        .inline(true)
                        .content_id("logo"),
                ),
        );
    let rendered = render_to_string(&mut message).await;

    assert!(rendered.contains("multipart/related"));
    assert!(rendered.contains("Content-ID: <logo>"));
    assert!(rendered.contains("Content-Disposition: inline"));
}

#[tokio::test]
async fn binary_attachment_is_wrapped_base64() {
    let payload: Vec<u8> = (0u16..=255).map(|b| b as u8).cycle().take(1000).collect();
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("binary")
        .attach(Attachment::data(payload.clone()).content_type("application/octet-stream"));
    let rendered = render_to_string(&mut message).await;

    assert!(rendered.contains(&base64_lines(&payload)));
    for line in rendered.split("\r\n") {
        assert!(line.len() <= 76, "overlong line: {line:?}");
    }
}

#[tokio::test]
async fn stream_attachment_streams() {
    let payload = b"streamed attachment payload".to_vec();
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("stream")
        .attach(
            Attachment::stream(std::io::Cursor::new(payload.clone()))
                .content_type("application/octet-stream")
                .name("payload.bin"),
        );
    let rendered = render_to_string(&mut message).await;
    assert!(rendered.contains(&base64_lines(&payload)));
}

#[tokio::test]
async fn path_attachment_reads_file() {
    let path = std::env::temp_dir().join("mailcourier-render-path-test.bin");
    let payload = b"path attachment payload".to_vec();
    tokio::fs::write(&path, &payload).await.unwrap();

    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text("file")
        .attach(
            Attachment::path(&path)
                .content_type("application/octet-stream")
                .name("payload.bin"),
        );
    let rendered = render_to_string(&mut message).await;
    tokio::fs::remove_file(&path).await.ok();

    assert!(rendered.contains(&base64_lines(&payload)));
}

#[tokio::test]
async fn long_recipient_lists_fold() {
    let recipients: Vec<String> = (0..12)
        .map(|i| format!("recipient-number-{i}@example.com"))
        .collect();
    let mut message = Message::new()
        .header("from", "a@x.com")
        .header("to", recipients.join(", "))
        .text("hi");
    let rendered = render_to_string(&mut message).await;

    let (head, _) = rendered.split_once("\r\n\r\n").unwrap();
    for line in head.split("\r\n") {
        assert!(line.len() <= 76, "overlong header line: {line:?}");
    }
    for recipient in &recipients {
        assert!(head.contains(recipient.as_str()));
    }
}
