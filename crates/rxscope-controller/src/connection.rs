//! Correlated connection to a debug agent.
//!
//! The `Connection` turns one TCP stream into request/response calls plus
//! an event feed:
//! - Every request carries a fresh id and suspends until the response with
//!   the same id arrives, whatever order responses come back in
//! - Frames without an id are events, dispatched to every callback
//!   registered for their method
//! - When the stream closes, every outstanding request is rejected

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rxscope_protocol::message::method;
use rxscope_protocol::{
    encode_line, qualified, Inbound, ProtocolError, Request, SubscribeParams, AGENT_DOMAIN,
};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Callback invoked with the params of a matching event.
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type Reply = oneshot::Sender<Result<Value, ConnectionError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Reply>>>;
type CallbackMap = Arc<Mutex<HashMap<String, Vec<EventCallback>>>>;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The stream could not be opened.
    #[error("Failed to connect to {address}: {error}")]
    Connect { address: String, error: String },

    /// A request was made before `connect` or after the stream closed.
    #[error("Not connected")]
    NotConnected,

    /// The stream closed before the response arrived.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The connection was disposed and cannot be reused.
    #[error("Connection disposed")]
    Disposed,

    /// The remote end answered with an error.
    #[error("Remote error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// Writing to the stream failed.
    #[error("IO error: {0}")]
    Io(String),

    /// A frame could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] ProtocolError),
}

// ============================================================================
// Connection
// ============================================================================

/// Duplex, correlated connection to one agent.
///
/// Shared by reference (`Arc<Connection>`); all methods take `&self`.
pub struct Connection {
    address: String,
    writer: tokio::sync::Mutex<Option<BufWriter<OwnedWriteHalf>>>,
    pending: PendingMap,
    callbacks: CallbackMap,
    next_id: AtomicU64,
    open: Arc<AtomicBool>,
    disposed: AtomicBool,
    cancel_token: CancellationToken,
}

impl Connection {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            writer: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            open: Arc::new(AtomicBool::new(false)),
            disposed: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns true while the stream is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Opens the stream and starts reading.
    ///
    /// Calling this again while the stream is open does nothing.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Disposed` after [`dispose`](Self::dispose)
    /// - `ConnectionError::Connect` if the address cannot be reached
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Disposed);
        }

        let mut writer = self.writer.lock().await;
        if writer.is_some() && self.is_open() {
            return Ok(());
        }

        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| ConnectionError::Connect {
                address: self.address.clone(),
                error: e.to_string(),
            })?;
        // `dispose` may have run while the stream was being opened.
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Disposed);
        }
        let (reader, write_half) = stream.into_split();

        *writer = Some(BufWriter::new(write_half));
        self.open.store(true, Ordering::SeqCst);

        tokio::spawn(read_loop(
            BufReader::new(reader).lines(),
            Arc::clone(&self.pending),
            Arc::clone(&self.callbacks),
            Arc::clone(&self.open),
            self.cancel_token.child_token(),
        ));

        info!(address = %self.address, "Connected to agent");
        Ok(())
    }

    /// Sends `<domain>.<method>` and waits for its response.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::NotConnected` if the stream is not open
    /// - `ConnectionError::Protocol` if the agent answered with an error
    /// - `ConnectionError::ConnectionClosed` if the stream closed first
    pub async fn request(
        &self,
        domain: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, qualified(domain, method), params);
        let line = encode_line(&request)?;

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        // The reader clears pending requests after marking the stream
        // closed; re-check so a request registered after that cannot hang.
        if !self.is_open() {
            lock(&self.pending).remove(&id);
            return Err(ConnectionError::ConnectionClosed);
        }

        if let Err(e) = self.write_line(&line).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }
        trace!(id, method = %request.method, "Request sent");

        rx.await.map_err(|_| ConnectionError::ConnectionClosed)?
    }

    /// Registers `callback` for `<domain>.<event>` and asks the agent to
    /// emit that event.
    ///
    /// Callbacks accumulate; every registered callback sees every event.
    ///
    /// # Errors
    ///
    /// Fails like [`request`](Self::request) if the subscribe call fails.
    /// The callback stays registered either way.
    pub async fn subscribe<F>(&self, domain: &str, event: &str, callback: F) -> Result<(), ConnectionError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let key = qualified(domain, event);
        lock(&self.callbacks)
            .entry(key.clone())
            .or_default()
            .push(Arc::new(callback));

        let params = serde_json::to_value(SubscribeParams { events: vec![key] })
            .map_err(ProtocolError::from)?;
        self.request(AGENT_DOMAIN, method::SUBSCRIBE, params).await?;
        Ok(())
    }

    /// Closes the stream, stops the reader and rejects outstanding requests.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_token.cancel();
        self.open.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "Failed to shut down stream");
            }
        }

        reject_pending(&self.pending);
        info!(address = %self.address, "Connection disposed");
    }

    async fn write_line(&self, line: &str) -> Result<(), ConnectionError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::NotConnected)?;

        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        result.map_err(|e| ConnectionError::Io(e.to_string()))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reader
// ============================================================================

async fn read_loop(
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    pending: PendingMap,
    callbacks: CallbackMap,
    open: Arc<AtomicBool>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Reader cancelled");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => dispatch(&line, &pending, &callbacks),
                    Ok(None) => {
                        debug!("Agent closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read from agent");
                        break;
                    }
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    reject_pending(&pending);
}

fn dispatch(line: &str, pending: &PendingMap, callbacks: &CallbackMap) {
    if line.trim().is_empty() {
        return;
    }

    match Inbound::parse(line) {
        Ok(Inbound::Response(response)) => {
            let id = response.id;
            let Some(reply) = lock(pending).remove(&id) else {
                debug!(id, "Discarding response without pending request");
                return;
            };
            let outcome = response
                .into_result()
                .map_err(|error| ConnectionError::Protocol {
                    code: error.code,
                    message: error.message,
                });
            // The requester may have gone away.
            let _ = reply.send(outcome);
        }
        Ok(Inbound::Event(event)) => {
            let handlers = lock(callbacks)
                .get(&event.method)
                .cloned()
                .unwrap_or_default();
            trace!(method = %event.method, handlers = handlers.len(), "Dispatching event");
            for handler in handlers {
                handler(&event.params);
            }
        }
        Err(e) => {
            warn!(error = %e, "Skipping unparsable frame");
        }
    }
}

fn reject_pending(pending: &PendingMap) {
    let rejected: Vec<Reply> = lock(pending).drain().map(|(_, reply)| reply).collect();
    if !rejected.is_empty() {
        debug!(count = rejected.len(), "Rejecting outstanding requests");
    }
    for reply in rejected {
        let _ = reply.send(Err(ConnectionError::ConnectionClosed));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
