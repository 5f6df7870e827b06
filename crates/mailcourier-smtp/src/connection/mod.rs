//! SMTP connection engine: the protocol state machine.
//!
//! A [`Connection`] owns the socket and drives the command/reply
//! dialogue: greeting, EHLO/HELO negotiation, STARTTLS upgrade,
//! authentication, and the MAIL/RCPT/DATA transaction. Each command
//! owns its reply accumulation; no parsing leaks across states.

mod config;
mod data;
mod stream;

pub use config::{ConnectionOptions, ConnectionOptionsBuilder, Security, DEFAULT_TIMEOUT};
pub use data::DotStuffWriter;
pub use stream::{connect, connect_tls, SmtpStream};

use crate::auth;
use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::parser::{is_final_line, parse_reply};
use crate::types::{AuthMechanism, Extensions, Reply, ReplyCode};
use mailcourier_mime::Message;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Pause before the single retry of a greylisted RCPT.
const GREYLIST_BACKOFF: Duration = Duration::from_millis(500);

/// Connection lifecycle state.
///
/// The discriminants are stable and observable through
/// [`Connection::state`]; the happy path walks 0→1→2→4→5→6→4, with
/// `Authorizing` visited when credentials are configured and any state
/// falling back to `NotConnected` on fatal error or close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Socket not open (initial, and terminal after close).
    NotConnected = 0,
    /// TCP/TLS handshake in progress.
    Connecting = 1,
    /// Banner received, ready for EHLO.
    Connected = 2,
    /// Mid-authentication exchange.
    Authorizing = 3,
    /// Session established, ready for MAIL FROM.
    Authorized = 4,
    /// Inside the MAIL/RCPT/DATA command sequence.
    Sending = 5,
    /// Inside the DATA payload.
    Data = 6,
}

impl State {
    /// The stable numeric value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a numeric value; anything unknown is `NotConnected`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Authorizing,
            4 => Self::Authorized,
            5 => Self::Sending,
            6 => Self::Data,
            _ => Self::NotConnected,
        }
    }
}

/// Shared, lock-free view of a connection's [`State`].
///
/// The mailer worker owns the connection; handles observe its state
/// through clones of this cell.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn store(&self, state: State) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Reads the current state.
    #[must_use]
    pub fn load(&self) -> State {
        State::from_u8(self.0.load(Ordering::SeqCst))
    }
}

fn not_connected() -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "not connected",
    ))
}

async fn read_reply_from(stream: &mut SmtpStream) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let line = stream.read_line().await?;
        trace!(line = %line, "server");
        let last = is_final_line(&line);
        lines.push(line);
        if last {
            break;
        }
    }
    parse_reply(&lines)
}

/// An SMTP session with one server.
///
/// Connects lazily, authenticates once, and can run any number of mail
/// transactions before `QUIT`.
#[derive(Debug)]
pub struct Connection {
    options: ConnectionOptions,
    stream: Option<SmtpStream>,
    state: StateCell,
    extensions: Extensions,
    // EHLO accepted; a HELO fallback leaves this false and disables AUTH.
    esmtp: bool,
}

impl Connection {
    /// Creates a connection from options. No I/O happens until
    /// [`connect`](Self::connect).
    #[must_use]
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            stream: None,
            state: StateCell::default(),
            extensions: Extensions::default(),
            esmtp: false,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// A shareable handle observing this connection's state.
    #[must_use]
    pub fn state_cell(&self) -> StateCell {
        self.state.clone()
    }

    /// The configuration this connection was built with.
    #[must_use]
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Capabilities from the most recent EHLO.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Whether a session is established and ready for MAIL FROM.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.stream.is_some() && self.state() == State::Authorized
    }

    /// Whether a socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connects, negotiates capabilities, upgrades to TLS when asked,
    /// and authenticates when credentials are configured. On success
    /// the connection is in `Authorized`.
    ///
    /// # Errors
    ///
    /// Any failure tears the socket down and resets to `NotConnected`:
    /// connect/TLS errors, timeouts, rejected greeting, failed STARTTLS,
    /// or failed authentication.
    pub async fn connect(&mut self) -> Result<()> {
        self.state.store(State::Connecting);
        let result = self.establish().await;
        if result.is_err() {
            self.destroy();
        }
        result
    }

    async fn establish(&mut self) -> Result<()> {
        let io_timeout = self.options.timeout;
        debug!(host = %self.options.host, port = self.options.port, "connecting");
        let stream = match self.options.security {
            Security::Implicit => timeout(
                io_timeout,
                connect_tls(
                    &self.options.host,
                    self.options.port,
                    self.options.tls_config.clone(),
                ),
            )
            .await
            .map_err(|_| Error::Timeout)??,
            Security::None | Security::StartTls => {
                timeout(io_timeout, connect(&self.options.host, self.options.port))
                    .await
                    .map_err(|_| Error::Timeout)??
            }
        };
        self.stream = Some(stream);

        // The banner is the implicit reply to the connect itself.
        let greeting = self.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::bad_response(
                "CONNECT",
                greeting.code.as_u16(),
                greeting.text(),
            ));
        }
        self.state.store(State::Connected);

        self.ehlo().await?;

        if self.options.security == Security::StartTls
            && !self.stream.as_ref().is_some_and(SmtpStream::is_tls)
        {
            if !self.extensions.starttls {
                return Err(Error::NotSupported("STARTTLS"));
            }
            self.starttls().await?;
        }

        if self.options.has_credentials() && self.esmtp {
            self.state.store(State::Authorizing);
            self.authenticate().await.map_err(|e| match e {
                Error::BadResponse { code, message, .. } if code == 535 => Error::Auth(message),
                other => other,
            })?;
        }
        self.state.store(State::Authorized);
        Ok(())
    }

    /// Sends EHLO and records capabilities; a 5xx rejection falls back
    /// to HELO with extensions (and authentication) disabled.
    async fn ehlo(&mut self) -> Result<()> {
        let domain = self.options.domain.clone();
        match self
            .command(&Command::Ehlo { domain: domain.clone() }, &[250])
            .await
        {
            Ok(reply) => {
                self.esmtp = true;
                self.extensions = Extensions::parse(&reply.lines[1..]);
                Ok(())
            }
            Err(Error::BadResponse { code, .. }) if code >= 500 => {
                debug!("EHLO rejected, falling back to HELO");
                self.esmtp = false;
                self.extensions = Extensions::default();
                self.command(&Command::Helo { domain }, &[250]).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Issues STARTTLS, swaps in the TLS transport, and refreshes
    /// capabilities with a second EHLO.
    async fn starttls(&mut self) -> Result<()> {
        self.command(&Command::StartTls, &[220]).await?;
        let stream = self.stream.take().ok_or_else(not_connected)?;
        let upgraded = timeout(
            self.options.timeout,
            stream.upgrade_to_tls(&self.options.host, self.options.tls_config.clone()),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        self.stream = Some(upgraded);
        debug!("TLS established, refreshing capabilities");
        self.ehlo().await
    }

    /// Runs one authentication exchange.
    ///
    /// Mechanism choice is the first of [`AuthMechanism::PREFERENCE`]
    /// allowed by the options and advertised by the server. A rejected
    /// exchange is terminal; there is no fallthrough to weaker
    /// mechanisms.
    async fn authenticate(&mut self) -> Result<()> {
        let user = self.options.user.clone().unwrap_or_default();
        let password = self.options.password.clone().unwrap_or_default();
        let mechanism = AuthMechanism::PREFERENCE
            .into_iter()
            .find(|m| {
                self.options.mechanisms.contains(m) && self.extensions.supports_mechanism(*m)
            })
            .ok_or_else(|| Error::Auth("no mutually supported mechanism".to_string()))?;
        debug!(%mechanism, "authenticating");

        match mechanism {
            AuthMechanism::Plain => {
                self.command(
                    &Command::Auth {
                        mechanism,
                        initial: Some(auth::plain_initial(&user, &password)),
                    },
                    &[235],
                )
                .await?;
            }
            AuthMechanism::Login => {
                self.command(&Command::Auth { mechanism, initial: None }, &[334])
                    .await?;
                self.command(
                    &Command::AuthResponse {
                        payload: auth::login_user(&user),
                    },
                    &[334],
                )
                .await?;
                self.command(
                    &Command::AuthResponse {
                        payload: auth::login_password(&password),
                    },
                    &[235],
                )
                .await?;
            }
            AuthMechanism::CramMd5 => {
                let challenge = self
                    .command(&Command::Auth { mechanism, initial: None }, &[334])
                    .await?;
                let answer = auth::cram_md5_answer(&user, &password, &challenge.text())?;
                self.command(&Command::AuthResponse { payload: answer }, &[235])
                    .await?;
            }
            AuthMechanism::XOAuth2 => {
                let reply = self
                    .command(
                        &Command::Auth {
                            mechanism,
                            initial: Some(auth::xoauth2_initial(&user, &password)),
                        },
                        &[235, 334],
                    )
                    .await?;
                if reply.code == ReplyCode::AUTH_CONTINUE {
                    // 334 here carries an error blob; acknowledge with an
                    // empty line, then surface the decoded payload.
                    let _ = self
                        .command(
                            &Command::AuthResponse {
                                payload: String::new(),
                            },
                            &[235],
                        )
                        .await;
                    return Err(Error::Auth(auth::decode_server_payload(&reply.text())));
                }
            }
        }
        Ok(())
    }

    /// Writes one command and returns its reply when the code is in
    /// `expected`.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] (connection destroyed) when no reply arrives
    /// in time, [`Error::Io`] (connection destroyed) on socket failure,
    /// [`Error::BadResponse`] when the server answers outside
    /// `expected`.
    pub async fn command(&mut self, command: &Command, expected: &[u16]) -> Result<Reply> {
        trace!(command = %command.redacted(), "client");
        let reply = match timeout(self.options.timeout, self.exchange(command)).await {
            Err(_) => {
                self.destroy();
                return Err(Error::Timeout);
            }
            Ok(Err(e)) => {
                if matches!(e, Error::Io(_)) {
                    self.destroy();
                }
                return Err(e);
            }
            Ok(Ok(reply)) => reply,
        };
        if expected.contains(&reply.code.as_u16()) {
            Ok(reply)
        } else {
            Err(Error::bad_response(
                command.verb(),
                reply.code.as_u16(),
                reply.text(),
            ))
        }
    }

    async fn exchange(&mut self, command: &Command) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.send(command.serialize().as_bytes()).await?;
        read_reply_from(stream).await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let io_timeout = self.options.timeout;
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        match timeout(io_timeout, read_reply_from(stream)).await {
            Err(_) => {
                self.destroy();
                Err(Error::Timeout)
            }
            Ok(Err(e)) => {
                self.destroy();
                Err(e)
            }
            Ok(Ok(reply)) => Ok(reply),
        }
    }

    /// Runs one mail transaction: MAIL FROM, RCPT TO for every
    /// recipient (with the single greylist retry), DATA, and the
    /// streamed payload.
    ///
    /// On a server rejection the session is reset with RSET and stays
    /// usable; on socket failure or timeout the connection is gone.
    ///
    /// # Errors
    ///
    /// See [`Error`]; every failure leaves the state machine in either
    /// `Authorized` (session recovered) or `NotConnected`.
    pub async fn send_mail(&mut self, envelope: &Envelope, message: &mut Message) -> Result<()> {
        if !self.is_ready() {
            return Err(not_connected());
        }
        self.state.store(State::Sending);
        let result = self.transaction(envelope, message).await;
        match &result {
            Ok(()) => self.state.store(State::Authorized),
            Err(_) => {
                if self.stream.is_some() {
                    let _ = self.command(&Command::Rset, &[250]).await;
                    if self.stream.is_some() {
                        self.state.store(State::Authorized);
                    }
                }
            }
        }
        result
    }

    async fn transaction(&mut self, envelope: &Envelope, message: &mut Message) -> Result<()> {
        self.command(
            &Command::MailFrom {
                from: envelope.from.clone(),
            },
            &[250],
        )
        .await?;
        for recipient in &envelope.recipients {
            self.rcpt_with_retry(recipient).await?;
        }
        self.command(&Command::Data, &[354]).await?;
        self.state.store(State::Data);
        self.stream_payload(message).await
    }

    async fn rcpt_with_retry(&mut self, recipient: &str) -> Result<()> {
        let command = Command::RcptTo {
            to: recipient.to_string(),
        };
        match self.command(&command, &[250, 251]).await {
            Err(Error::BadResponse { code: 450, .. }) => {
                debug!(recipient, "greylisted, retrying once");
                tokio::time::sleep(GREYLIST_BACKOFF).await;
                self.command(&command, &[250, 251]).await.map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }

    async fn stream_payload(&mut self, message: &mut Message) -> Result<()> {
        let domain = self.options.domain.clone();
        let stream = self.stream.take().ok_or_else(not_connected)?;
        let mut writer = DotStuffWriter::new(stream);
        match mailcourier_mime::render::render(message, &domain, &mut writer).await {
            Ok(()) => {
                let stream = writer.finish().await?;
                self.stream = Some(stream);
            }
            Err(e) => {
                // Mid-payload failure cannot be recovered in-session.
                self.destroy();
                return Err(e.into());
            }
        }
        let reply = self.read_reply().await?;
        if reply.code == ReplyCode::OK {
            Ok(())
        } else {
            Err(Error::bad_response(
                "DATA",
                reply.code.as_u16(),
                reply.text(),
            ))
        }
    }

    /// Sends NOOP as a keepalive probe.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(&Command::Noop, &[250]).await.map(|_| ())
    }

    /// Closes the connection: politely with QUIT unless `force`, then
    /// unconditionally tears down and resets to `NotConnected`.
    pub async fn close(&mut self, force: bool) {
        if !force && self.stream.is_some() {
            if let Err(e) = self.command(&Command::Quit, &[221, 250]).await {
                trace!(error = %e, "QUIT failed during close");
            }
        }
        self.destroy();
    }

    fn destroy(&mut self) {
        self.stream = None;
        self.extensions = Extensions::default();
        self.esmtp = false;
        self.state.store(State::NotConnected);
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
    fn state_round_trip() {
        for state in [
            State::NotConnected,
            State::Connecting,
            State::Connected,
            State::Authorizing,
            State::Authorized,
            State::Sending,
            State::Data,
        ] {
            assert_eq!(State::from_u8(state.as_u8()), state);
            assert!(state.as_u8() <= 6);
        }
        assert_eq!(State::from_u8(42), State::NotConnected);
    }

    #[test]
    fn new_connection_is_idle() {
        let connection = Connection::new(ConnectionOptions::default());
        assert_eq!(connection.state(), State::NotConnected);
        assert!(!connection.is_ready());
        assert!(!connection.is_connected());
        assert_eq!(connection.extensions(), &Extensions::default());
    }

    #[test]
    fn state_cell_is_shared() {
        let connection = Connection::new(ConnectionOptions::default());
        let cell = connection.state_cell();
        connection.state.store(State::Authorized);
        assert_eq!(cell.load(), State::Authorized);
    }
}
