//! Scripted loopback SMTP server for end-to-end client tests.
//!
//! Accepts real TCP connections and answers from a canned script:
//! per-command replies, reply sequences for RCPT (greylist scenarios)
//! and AUTH exchanges, optional response delays, and an optional
//! silent mode for timeout tests. Received commands and DATA payloads
//! are recorded for verification.

#![allow(dead_code)] // shared across test binaries; not every test uses every knob

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};

/// Script for one mock server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Banner; `None` keeps the server silent (timeout scenarios).
    pub greeting: Option<String>,
    /// Code for EHLO; anything but 250 rejects it (HELO fallback).
    pub ehlo_code: u16,
    /// Extension lines advertised after the EHLO greeting line.
    pub extensions: Vec<String>,
    /// Replies consumed by the AUTH exchange, one per client line.
    /// A reply starting `334` makes the server await a continuation.
    pub auth_replies: Vec<String>,
    /// Reply to MAIL FROM.
    pub mail_reply: String,
    /// Replies consumed per RCPT TO; the last one repeats.
    pub rcpt_replies: Vec<String>,
    /// Reply after the DATA terminator.
    pub data_reply: String,
    /// Delay applied before every reply.
    pub response_delay: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            greeting: Some("220 mock ESMTP ready".to_string()),
            ehlo_code: 250,
            extensions: Vec::new(),
            auth_replies: Vec::new(),
            mail_reply: "250 sender ok".to_string(),
            rcpt_replies: vec!["250 recipient ok".to_string()],
            data_reply: "250 queued".to_string(),
            response_delay: None,
        }
    }
}

/// Installs a test-writer subscriber once so protocol traces show up
/// under `--nocapture`.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Default)]
struct Recorder {
    commands: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
    connections: AtomicUsize,
}

/// A running mock server.
pub struct MockServer {
    addr: SocketAddr,
    recorder: Arc<Recorder>,
}

impl MockServer {
    /// Binds to an ephemeral loopback port and starts accepting.
    pub async fn start(config: ServerConfig) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let recorder = Arc::new(Recorder::default());

        let accept_recorder = Arc::clone(&recorder);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                accept_recorder.connections.fetch_add(1, Ordering::SeqCst);
                let config = config.clone();
                let recorder = Arc::clone(&accept_recorder);
                tokio::spawn(async move {
                    let _ = handle_session(stream, config, recorder).await;
                });
            }
        });

        Self { addr, recorder }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every line the clients sent, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.recorder.commands.lock().expect("lock").clone()
    }

    /// Received DATA payloads, dot-unstuffed, one string per message.
    pub fn messages(&self) -> Vec<String> {
        self.recorder.messages.lock().expect("lock").clone()
    }

    /// How many TCP connections were accepted.
    pub fn connections(&self) -> usize {
        self.recorder.connections.load(Ordering::SeqCst)
    }
}

async fn reply(
    writer: &mut OwnedWriteHalf,
    config: &ServerConfig,
    line: &str,
) -> std::io::Result<()> {
    if let Some(delay) = config.response_delay {
        tokio::time::sleep(delay).await;
    }
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

async fn handle_session(
    stream: TcpStream,
    config: ServerConfig,
    recorder: Arc<Recorder>,
) -> std::io::Result<()> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let Some(greeting) = config.greeting.clone() else {
        // Silent server: hold the socket open, never greet.
        let mut sink = String::new();
        loop {
            sink.clear();
            if reader.read_line(&mut sink).await? == 0 {
                return Ok(());
            }
        }
    };
    reply(&mut writer, &config, &greeting).await?;

    let mut auth_replies = config.auth_replies.iter();
    let mut awaiting_auth_line = false;
    let mut rcpt_count = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        recorder.commands.lock().expect("lock").push(line.clone());

        if awaiting_auth_line {
            let next = auth_replies.next().cloned().unwrap_or_else(|| "235 ok".to_string());
            awaiting_auth_line = next.starts_with("334");
            reply(&mut writer, &config, &next).await?;
            continue;
        }

        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_ascii_uppercase();
        match verb.as_str() {
            "EHLO" => {
                if config.ehlo_code == 250 {
                    if config.extensions.is_empty() {
                        reply(&mut writer, &config, "250 mock greets you").await?;
                    } else {
                        reply(&mut writer, &config, "250-mock greets you").await?;
                        let last = config.extensions.len() - 1;
                        for (i, extension) in config.extensions.iter().enumerate() {
                            let sep = if i == last { ' ' } else { '-' };
                            let text = format!("{}{sep}{extension}", config.ehlo_code);
                            reply(&mut writer, &config, &text).await?;
                        }
                    }
                } else {
                    let text = format!("{} command not implemented", config.ehlo_code);
                    reply(&mut writer, &config, &text).await?;
                }
            }
            "HELO" => reply(&mut writer, &config, "250 mock greets you").await?,
            "AUTH" => {
                let next = auth_replies.next().cloned().unwrap_or_else(|| "235 ok".to_string());
                awaiting_auth_line = next.starts_with("334");
                reply(&mut writer, &config, &next).await?;
            }
            "MAIL" => reply(&mut writer, &config, &config.mail_reply).await?,
            "RCPT" => {
                let index = rcpt_count.min(config.rcpt_replies.len() - 1);
                let text = config.rcpt_replies[index].clone();
                rcpt_count += 1;
                reply(&mut writer, &config, &text).await?;
            }
            "DATA" => {
                reply(&mut writer, &config, "354 end data with <CRLF>.<CRLF>").await?;
                let mut payload = String::new();
                let mut data_line = String::new();
                loop {
                    data_line.clear();
                    if reader.read_line(&mut data_line).await? == 0 {
                        return Ok(());
                    }
                    let data_line = data_line.trim_end_matches(['\r', '\n']);
                    if data_line == "." {
                        break;
                    }
                    let unstuffed = data_line.strip_prefix('.').unwrap_or(data_line);
                    payload.push_str(unstuffed);
                    payload.push_str("\r\n");
                }
                recorder.messages.lock().expect("lock").push(payload);
                reply(&mut writer, &config, &config.data_reply).await?;
            }
            "RSET" | "NOOP" => reply(&mut writer, &config, "250 ok").await?,
            "STARTTLS" => reply(&mut writer, &config, "454 TLS not available").await?,
            "QUIT" => {
                reply(&mut writer, &config, "221 bye").await?;
                return Ok(());
            }
            _ => reply(&mut writer, &config, "500 unrecognized").await?,
        }
    }
}
