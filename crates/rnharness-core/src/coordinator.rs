//! TCP server the test app reports its results to.
//!
//! The [`Coordinator`] listens on a local port (reversed onto Android devices
//! with `adb reverse`) and waits for the app to connect, identify itself and
//! stream test events. The first `End` message delivers the failure count to
//! [`Coordinator::run`]; it is delivered exactly once.
//!
//! Each coordinator carries an id (the platform name). Apps that announce a
//! different id are rejected, so an Android emulator and an iOS simulator
//! running side by side cannot report into each other's run.
//!
//! See [`crate::protocol`] for the message format.
//!
//! # Example
//!
//! ```no_run
//! use rnharness_core::coordinator::Coordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut coordinator = Coordinator::new("ios", 8090);
//! coordinator.start().await?;
//! // ... launch the app ...
//! let failures = coordinator.run().await?;
//! println!("{failures} test(s) failed");
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::protocol::{decode_line, encode_line, ClientMessage, ServerMessage};

type ResultSender = Arc<Mutex<Option<oneshot::Sender<u32>>>>;

/// Errors that can occur while coordinating a test run.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The listening socket could not be bound.
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// [`Coordinator::run`] was called before [`Coordinator::start`], or twice.
    #[error("Coordinator is not started")]
    NotStarted,

    /// The app did not report results within the configured timeout.
    #[error("Timed out after {0:?} waiting for the app to report test results")]
    Timeout(Duration),

    /// The coordinator stopped before any results were reported.
    #[error("Coordinator closed before the app reported test results")]
    Closed,

    /// An I/O error occurred on a client connection.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A client sent a line that is not a valid protocol message.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Remote test coordinator for one run.
pub struct Coordinator {
    id: String,
    port: u16,
    result_rx: Option<oneshot::Receiver<u32>>,
    cancel_token: CancellationToken,
    accept_handle: Option<JoinHandle<()>>,
}

impl Coordinator {
    /// Creates a coordinator that only accepts apps announcing `id`.
    ///
    /// Port `0` lets the OS pick a free port; [`Self::start`] returns the bound address.
    pub fn new(id: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            port,
            result_rx: None,
            cancel_token: CancellationToken::new(),
            accept_handle: None,
        }
    }

    /// Binds `127.0.0.1:<port>` and starts accepting apps in the background.
    ///
    /// Returns the bound address.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Bind`] if the port is unavailable
    pub async fn start(&mut self) -> Result<SocketAddr, CoordinatorError> {
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|source| CoordinatorError::Bind {
                port: self.port,
                source,
            })?;
        let addr = listener.local_addr()?;

        let (result_tx, result_rx) = oneshot::channel();
        let result_tx: ResultSender = Arc::new(Mutex::new(Some(result_tx)));
        let id = self.id.clone();
        let token = self.cancel_token.clone();

        self.accept_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Coordinator accept loop cancelled"),
                _ = accept_loop(listener, id, result_tx, token.child_token()) => {}
            }
        }));
        self.result_rx = Some(result_rx);

        info!(id = %self.id, %addr, "Coordinator listening");
        Ok(addr)
    }

    /// Waits until a connected app reports the end of its run.
    ///
    /// Returns the number of failed tests. There is no timeout; see
    /// [`Self::run_with_timeout`].
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::NotStarted`] if not started or already run
    /// - [`CoordinatorError::Closed`] if the coordinator stopped without a result
    pub async fn run(&mut self) -> Result<u32, CoordinatorError> {
        let rx = self.result_rx.take().ok_or(CoordinatorError::NotStarted)?;
        let failures = rx.await.map_err(|_| CoordinatorError::Closed)?;
        info!(failures, "App reported test results");
        Ok(failures)
    }

    /// Like [`Self::run`], but gives up after `timeout` when one is set.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Timeout`] if no result arrives in time
    /// - Any error from [`Self::run`]
    pub async fn run_with_timeout(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<u32, CoordinatorError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.run())
                .await
                .map_err(|_| CoordinatorError::Timeout(limit))?,
            None => self.run().await,
        }
    }

    /// Stops accepting apps, closes the listening socket and drops every
    /// connected app.
    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.accept_handle.take() {
            handle.abort();
            debug!(id = %self.id, "Coordinator stopped");
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    id: String,
    result_tx: ResultSender,
    token: CancellationToken,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Coordinator failed to accept connection");
                return;
            }
        };
        debug!(%peer, "App connected");

        let id = id.clone();
        let result_tx = result_tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let span = info_span!("app_client", %peer);
            tokio::select! {
                _ = token.cancelled() => debug!(%peer, "Dropping app connection"),
                result = handle_client(stream, &id, result_tx).instrument(span) => {
                    if let Err(e) = result {
                        warn!(%peer, error = %e, "App connection failed");
                    }
                }
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    id: &str,
    result_tx: ResultSender,
) -> Result<(), CoordinatorError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let reply = match decode_line::<ClientMessage>(&line)? {
        ClientMessage::Hello { id: announced } if announced == id => ServerMessage::Run,
        ClientMessage::Hello { id: announced } => ServerMessage::Rejected {
            reason: format!("expected id {id:?}, got {announced:?}"),
        },
        other => ServerMessage::Rejected {
            reason: format!("expected Hello, got {other:?}"),
        },
    };
    writer.write_all(encode_line(&reply)?.as_bytes()).await?;
    writer.flush().await?;

    if let ServerMessage::Rejected { reason } = reply {
        warn!(%reason, "Rejected app connection");
        return Ok(());
    }
    info!("App connected, running tests");

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            warn!("App disconnected before reporting test results");
            return Ok(());
        }

        match decode_line::<ClientMessage>(&line)? {
            ClientMessage::SuiteStarted { title } => info!(suite = %title, "Suite started"),
            ClientMessage::TestPassed { title } => info!(test = %title, "passed"),
            ClientMessage::TestFailed { title, error } => {
                warn!(test = %title, %error, "FAILED")
            }
            ClientMessage::TestPending { title } => info!(test = %title, "pending"),
            ClientMessage::Hello { .. } => debug!("Ignoring repeated Hello"),
            ClientMessage::End { failures } => {
                match result_tx.lock().await.take() {
                    Some(tx) => {
                        let _ = tx.send(failures);
                    }
                    None => warn!(failures, "Ignoring results of a repeated run"),
                }
                return Ok(());
            }
        }
    }
}

/// App-side connection to a [`Coordinator`].
///
/// Used by tests and by Rust-side app harnesses to report results.
pub struct CoordinatorClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl CoordinatorClient {
    /// Connects to `addr` and announces `id`.
    ///
    /// Returns the coordinator's reply together with the client; a
    /// [`ServerMessage::Rejected`] reply means the connection is about to close.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Io`] if the connection fails or closes early
    /// - [`CoordinatorError::Json`] if the reply is malformed
    pub async fn connect(
        addr: SocketAddr,
        id: &str,
    ) -> Result<(Self, ServerMessage), CoordinatorError> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(reader),
            writer,
        };

        client
            .send(&ClientMessage::Hello { id: id.to_string() })
            .await?;

        let mut line = String::new();
        if client.reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        let reply = decode_line(&line)?;
        Ok((client, reply))
    }

    /// Sends one message.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Io`] if the write fails
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), CoordinatorError> {
        self.writer
            .write_all(encode_line(message)?.as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reports the end of the run with `failures` failed tests.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::Io`] if the write fails
    pub async fn end(mut self, failures: u32) -> Result<(), CoordinatorError> {
        self.send(&ClientMessage::End { failures }).await
    }
}
