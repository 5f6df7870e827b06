//! High-level send API: the sequential mailer.
//!
//! A [`Mailer`] owns a FIFO queue drained by a worker task that holds
//! the [`Connection`]. At most one message is ever in flight; a later
//! send does not start its dialogue until the prior one completed or
//! failed. Every send resolves exactly once: completion travels over a
//! oneshot channel, so a second resolution is structurally impossible.

use crate::connection::{Connection, ConnectionOptions, State, StateCell};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use mailcourier_mime::Message;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

struct Job {
    message: Message,
    done: oneshot::Sender<Result<Message>>,
}

/// A pending send. Resolves exactly once with the delivered message or
/// the failure that ended it.
#[derive(Debug)]
pub struct Delivery {
    rx: oneshot::Receiver<Result<Message>>,
}

impl Future for Delivery {
    type Output = Result<Message>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|res| match res {
            Ok(result) => result,
            Err(_) => Err(Error::Closed),
        })
    }
}

/// An SMTP client: one target host, one connection, one ordered queue.
///
/// Must be created inside a tokio runtime; the worker task lives until
/// the mailer is dropped (graceful drain, then QUIT) or
/// [`close`](Self::close)d (pending sends fail with [`Error::Closed`]).
#[derive(Debug)]
pub struct Mailer {
    tx: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
    ready: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
    state: StateCell,
}

impl Mailer {
    /// Creates a mailer and spawns its worker.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when the options carry a password
    /// without a user. The check runs here as well as in the options
    /// builder, since `ConnectionOptions` can be assembled by hand.
    pub fn new(options: ConnectionOptions) -> Result<Self> {
        options.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(options);
        let state = connection.state_cell();
        let ready = Arc::new(AtomicBool::new(false));
        let sending = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(run_worker(
            rx,
            connection,
            Arc::clone(&ready),
            Arc::clone(&sending),
        ));
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            ready,
            sending,
            state,
        })
    }

    /// Enqueues a message and waits for its completion.
    ///
    /// # Errors
    ///
    /// Exactly one of the failure modes in [`Error`]: validation,
    /// connect, TLS, authentication, protocol rejection, timeout, or
    /// [`Error::Closed`].
    pub async fn send(&self, message: Message) -> Result<Message> {
        self.enqueue(message).await
    }

    /// Enqueues a message, returning a handle that resolves when the
    /// send completes or fails. Queue position is the call order.
    #[must_use]
    pub fn enqueue(&self, message: Message) -> Delivery {
        let (done, rx) = oneshot::channel();
        match &self.tx {
            Some(tx) => {
                if let Err(rejected) = tx.send(Job { message, done }) {
                    let Job { done, .. } = rejected.0;
                    let _ = done.send(Err(Error::Closed));
                }
            }
            None => {
                let _ = done.send(Err(Error::Closed));
            }
        }
        Delivery { rx }
    }

    /// Whether the connection is established and authorized.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Whether a send is currently driving the connection.
    #[must_use]
    pub fn sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// The connection's lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.state.load()
    }

    /// Closes the client immediately.
    ///
    /// The in-flight send (if any) and every queued job fail with
    /// [`Error::Closed`]; no job is silently dropped. The socket is
    /// torn down without QUIT.
    pub async fn close(&mut self) {
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            worker.abort();
            let _ = worker.await;
        }
        self.ready.store(false, Ordering::SeqCst);
        self.sending.store(false, Ordering::SeqCst);
        self.state.store(State::NotConnected);
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    mut connection: Connection,
    ready: Arc<AtomicBool>,
    sending: Arc<AtomicBool>,
) {
    let idle = connection.options().timeout;
    loop {
        let job = if connection.is_connected() {
            match timeout(idle, rx.recv()).await {
                Ok(job) => job,
                Err(_) => {
                    // Idle session: QUIT now, reconnect lazily on the
                    // next send.
                    debug!("idle timeout, recycling connection");
                    connection.close(false).await;
                    ready.store(false, Ordering::SeqCst);
                    continue;
                }
            }
        } else {
            rx.recv().await
        };
        let Some(job) = job else {
            // Mailer dropped: drain is complete, leave politely.
            connection.close(false).await;
            return;
        };

        sending.store(true, Ordering::SeqCst);
        let result = process(&mut connection, job.message).await;
        if let Err(e) = &result {
            warn!(error = %e, "send failed");
        }
        ready.store(connection.is_ready(), Ordering::SeqCst);
        sending.store(false, Ordering::SeqCst);
        let _ = job.done.send(result);
    }
}

async fn process(connection: &mut Connection, mut message: Message) -> Result<Message> {
    // Validation failures never touch the connection.
    message.check_validity()?;
    let envelope = Envelope::from_message(&message)?;
    if !connection.is_ready() {
        connection.connect().await?;
    }
    connection.send_mail(&envelope, &mut message).await?;
    Ok(message)
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

    fn message() -> Message {
        Message::new()
            .header("from", "a@x.com")
            .header("to", "b@x.com")
            .text("hi")
    }

    #[tokio::test]
    async fn password_without_user_fails_at_construction() {
        // A hand-assembled options value must not dodge the builder's
        // check.
        let options = ConnectionOptions {
            password: Some("hunter2".to_string()),
            ..ConnectionOptions::default()
        };
        let err = Mailer::new(options).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err}");
    }

    #[tokio::test]
    async fn enqueue_after_close_fails_immediately() {
        let mut mailer = Mailer::new(ConnectionOptions::default()).unwrap();
        mailer.close().await;
        let result = mailer.send(message()).await;
        assert!(matches!(result, Err(Error::Closed)));
        assert_eq!(mailer.state(), State::NotConnected);
        assert!(!mailer.ready());
        assert!(!mailer.sending());
    }

    #[tokio::test]
    async fn invalid_message_resolves_without_touching_connection() {
        let mailer = Mailer::new(ConnectionOptions::default()).unwrap();
        let result = mailer.send(Message::new().text("no headers")).await;
        assert!(matches!(
            result,
            Err(Error::InvalidMessage(
                mailcourier_mime::ValidationError::MissingFrom
            ))
        ));
        assert_eq!(mailer.state(), State::NotConnected);
    }
}
