//! End-to-end client tests against a scripted loopback server.

#![allow(clippy::unwrap_used)]

mod support;

use mailcourier_mime::Message;
use mailcourier_smtp::{auth, AuthMechanism, ConnectionOptions, Error, Mailer, Security, State};
use std::time::Duration;
use support::{MockServer, ServerConfig};

fn options_for(server: &MockServer) -> ConnectionOptions {
    ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .security(Security::None)
        .domain("client.test")
        .build()
        .unwrap()
}

fn simple_message() -> Message {
    Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("subject", "loopback")
        .text("hi")
}

#[tokio::test]
async fn simple_send_round_trip() {
    let server = MockServer::start(ServerConfig::default()).await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let message = mailer.send(simple_message()).await.unwrap();
    assert_eq!(message.text.as_deref(), Some("hi"));
    assert!(mailer.ready());
    assert!(!mailer.sending());
    assert_eq!(mailer.state(), State::Authorized);

    let commands = server.commands();
    assert!(commands.iter().any(|c| c == "EHLO client.test"));
    assert!(commands.iter().any(|c| c == "MAIL FROM:<a@x.com>"));
    assert!(commands.iter().any(|c| c == "RCPT TO:<b@x.com>"));
    assert!(commands.iter().any(|c| c == "DATA"));

    let messages = server.messages();
    assert_eq!(messages.len(), 1);
    let received = &messages[0];
    assert!(received.contains("From: a@x.com"));
    assert!(received.contains("Subject: loopback"));
    assert!(received.contains("\r\n\r\nhi\r\n"));
}

#[tokio::test]
async fn duplicate_recipients_get_one_rcpt() {
    let server = MockServer::start(ServerConfig::default()).await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .header("cc", "b@x.com")
        .header("bcc", "b@x.com")
        .text("hi");
    mailer.send(message).await.unwrap();

    let commands = server.commands();
    let rcpts: Vec<&String> = commands.iter().filter(|c| c.starts_with("RCPT")).collect();
    assert_eq!(rcpts.len(), 1);
    assert_eq!(rcpts[0], "RCPT TO:<b@x.com>");
}

#[tokio::test]
async fn greylist_retry_succeeds() {
    let server = MockServer::start(ServerConfig {
        rcpt_replies: vec!["450 greylist".to_string(), "250 ok".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    mailer.send(simple_message()).await.unwrap();

    let rcpts = server
        .commands()
        .iter()
        .filter(|c| c.starts_with("RCPT"))
        .count();
    assert_eq!(rcpts, 2, "exactly one retry");
    assert_eq!(server.messages().len(), 1);
}

#[tokio::test]
async fn greylist_double_fail_surfaces_server_text() {
    let server = MockServer::start(ServerConfig {
        rcpt_replies: vec!["450 greylist".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert_eq!(err.to_string(), "bad response on command 'RCPT': greylist");

    // The session survives a greylisted transaction.
    assert_eq!(mailer.state(), State::Authorized);
    assert!(server.commands().iter().any(|c| c == "RSET"));
}

#[tokio::test]
async fn sends_are_strictly_ordered() {
    let server = MockServer::start(ServerConfig::default()).await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let first = mailer.enqueue(
        Message::new()
            .header("from", "first@x.com")
            .header("to", "b@x.com")
            .text("first"),
    );
    let second = mailer.enqueue(
        Message::new()
            .header("from", "second@x.com")
            .header("to", "b@x.com")
            .text("second"),
    );
    first.await.unwrap();
    second.await.unwrap();

    let commands = server.commands();
    let mails: Vec<&String> = commands.iter().filter(|c| c.starts_with("MAIL")).collect();
    assert_eq!(mails, ["MAIL FROM:<first@x.com>", "MAIL FROM:<second@x.com>"]);

    let messages = server.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].contains("first"));
    assert!(messages[1].contains("second"));
    // Session reuse: both rode one connection.
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn auth_plain_exchange() {
    let server = MockServer::start(ServerConfig {
        extensions: vec!["AUTH PLAIN".to_string()],
        auth_replies: vec!["235 accepted".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .user("alice")
        .password("hunter2")
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    mailer.send(simple_message()).await.unwrap();

    let expected = format!("AUTH PLAIN {}", auth::plain_initial("alice", "hunter2"));
    assert!(server.commands().iter().any(|c| *c == expected));
}

#[tokio::test]
async fn auth_login_exchange() {
    let server = MockServer::start(ServerConfig {
        extensions: vec!["AUTH LOGIN".to_string()],
        auth_replies: vec![
            "334 VXNlcm5hbWU6".to_string(),
            "334 UGFzc3dvcmQ6".to_string(),
            "235 accepted".to_string(),
        ],
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .user("alice")
        .password("hunter2")
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    mailer.send(simple_message()).await.unwrap();

    let commands = server.commands();
    assert!(commands.iter().any(|c| c == "AUTH LOGIN"));
    assert!(commands.iter().any(|c| *c == auth::login_user("alice")));
    assert!(commands.iter().any(|c| *c == auth::login_password("hunter2")));
}

#[tokio::test]
async fn auth_cram_md5_exchange() {
    let challenge = auth::plain_initial("", ""); // any base64 works as a challenge
    let server = MockServer::start(ServerConfig {
        extensions: vec!["AUTH PLAIN LOGIN CRAM-MD5".to_string()],
        auth_replies: vec![format!("334 {challenge}"), "235 accepted".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .user("alice")
        .password("hunter2")
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    mailer.send(simple_message()).await.unwrap();

    // CRAM-MD5 outranks the other advertised mechanisms.
    let commands = server.commands();
    assert!(commands.iter().any(|c| c == "AUTH CRAM-MD5"));
    let expected = auth::cram_md5_answer("alice", "hunter2", &challenge).unwrap();
    assert!(commands.iter().any(|c| *c == expected));
}

#[tokio::test]
async fn auth_failure_is_terminal() {
    let server = MockServer::start(ServerConfig {
        extensions: vec!["AUTH PLAIN LOGIN".to_string()],
        auth_replies: vec!["535 credentials rejected".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .user("alice")
        .password("wrong")
        .mechanisms(vec![AuthMechanism::Plain, AuthMechanism::Login])
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "{err}");
    assert_eq!(mailer.state(), State::NotConnected);

    // No fallthrough to a second mechanism.
    let auth_attempts = server
        .commands()
        .iter()
        .filter(|c| c.starts_with("AUTH "))
        .count();
    assert_eq!(auth_attempts, 1);
}

#[tokio::test]
async fn xoauth2_error_gets_empty_continuation() {
    let blob = auth::xoauth2_initial("", ""); // stand-in base64 error payload
    let server = MockServer::start(ServerConfig {
        extensions: vec!["AUTH XOAUTH2".to_string()],
        auth_replies: vec![format!("334 {blob}"), "535 denied".to_string()],
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .user("alice")
        .password("stale-token")
        .mechanisms(vec![AuthMechanism::XOAuth2])
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)), "{err}");

    // The 334 error was acknowledged with an empty line.
    let commands = server.commands();
    let auth_pos = commands.iter().position(|c| c.starts_with("AUTH XOAUTH2")).unwrap();
    assert_eq!(commands[auth_pos + 1], "");
}

#[tokio::test]
async fn ehlo_rejection_falls_back_to_helo() {
    let server = MockServer::start(ServerConfig {
        ehlo_code: 502,
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .domain("client.test")
        .user("alice")
        .password("hunter2")
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    mailer.send(simple_message()).await.unwrap();

    let commands = server.commands();
    assert!(commands.iter().any(|c| c == "HELO client.test"));
    // HELO session: no extensions, so authentication is skipped.
    assert!(!commands.iter().any(|c| c.starts_with("AUTH")));
}

#[tokio::test]
async fn required_starttls_missing_is_fatal() {
    let server = MockServer::start(ServerConfig::default()).await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .security(Security::StartTls)
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert!(matches!(err, Error::NotSupported("STARTTLS")), "{err}");
    assert_eq!(mailer.state(), State::NotConnected);
}

#[tokio::test]
async fn connect_failure_resolves_each_send_once() {
    // Grab a port that refuses connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let options = ConnectionOptions::builder("127.0.0.1")
        .port(port)
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Timeout), "{err}");
    assert_eq!(mailer.state(), State::NotConnected);
    assert!(!mailer.ready());

    // The client recovers enough to fail the next send too.
    let err = mailer.send(simple_message()).await.unwrap_err();
    assert!(matches!(err, Error::Io(_) | Error::Timeout), "{err}");
}

#[tokio::test]
async fn silent_server_times_out() {
    let server = MockServer::start(ServerConfig {
        greeting: None,
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    let err = mailer.send(simple_message()).await.unwrap_err();
    assert_eq!(err.to_string(), "timeout");
    assert_eq!(mailer.state(), State::NotConnected);
}

#[tokio::test]
async fn state_returns_to_zero_after_close() {
    let server = MockServer::start(ServerConfig::default()).await;
    let mut mailer = Mailer::new(options_for(&server)).unwrap();

    mailer.send(simple_message()).await.unwrap();
    assert_eq!(mailer.state(), State::Authorized);

    mailer.close().await;
    assert_eq!(mailer.state(), State::NotConnected);
    assert_eq!(mailer.state().as_u8(), 0);
}

#[tokio::test]
async fn close_fails_pending_sends() {
    let server = MockServer::start(ServerConfig {
        response_delay: Some(Duration::from_millis(200)),
        ..ServerConfig::default()
    })
    .await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let mut mailer = Mailer::new(options).unwrap();

    let in_flight = mailer.enqueue(simple_message());
    let queued = mailer.enqueue(simple_message());
    tokio::time::sleep(Duration::from_millis(50)).await;
    mailer.close().await;

    assert!(matches!(in_flight.await, Err(Error::Closed)));
    assert!(matches!(queued.await, Err(Error::Closed)));
}

#[tokio::test]
async fn idle_connection_is_recycled() {
    let server = MockServer::start(ServerConfig::default()).await;
    let options = ConnectionOptions::builder("127.0.0.1")
        .port(server.port())
        .timeout(Duration::from_millis(150))
        .build()
        .unwrap();
    let mailer = Mailer::new(options).unwrap();

    mailer.send(simple_message()).await.unwrap();
    assert!(mailer.ready());

    // Let the idle window lapse: the worker QUITs and drops the socket.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!mailer.ready());
    assert_eq!(mailer.state(), State::NotConnected);
    assert!(server.commands().iter().any(|c| c == "QUIT"));

    // The next send reconnects lazily.
    mailer.send(simple_message()).await.unwrap();
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn attachments_round_trip() {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use mailcourier_mime::Attachment;

    let stream_payload = b"streamed bytes for the wire".to_vec();
    let path = std::env::temp_dir().join("mailcourier-loopback-attachment.bin");
    let path_payload = b"file bytes for the wire".to_vec();
    tokio::fs::write(&path, &path_payload).await.unwrap();

    let server = MockServer::start(ServerConfig::default()).await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let message = simple_message()
        .attach(
            Attachment::stream(std::io::Cursor::new(stream_payload.clone()))
                .content_type("application/octet-stream")
                .name("stream.bin"),
        )
        .attach(
            Attachment::path(&path)
                .content_type("application/octet-stream")
                .name("file.bin"),
        );
    mailer.send(message).await.unwrap();
    tokio::fs::remove_file(&path).await.ok();

    let received = server.messages().remove(0);
    assert!(received.contains("multipart/mixed"));
    assert!(received.contains(&STANDARD.encode(&stream_payload)));
    assert!(received.contains(&STANDARD.encode(&path_payload)));
}

#[tokio::test]
async fn dotted_lines_survive_transport() {
    let server = MockServer::start(ServerConfig::default()).await;
    let mailer = Mailer::new(options_for(&server)).unwrap();

    let message = Message::new()
        .header("from", "a@x.com")
        .header("to", "b@x.com")
        .text(".leading dot\n..two dots\nplain");
    mailer.send(message).await.unwrap();

    // The server's un-stuffed view matches the original text.
    let received = server.messages().remove(0);
    assert!(received.contains("\r\n.leading dot\r\n..two dots\r\nplain"));
}
