//! Handler for one controller connection.
//!
//! Each frame from the controller is a request and gets exactly one
//! response. Binding events (readiness and telemetry) are pushed once the
//! controller has enabled the runtime domain, installed the binding and
//! subscribed to `Runtime.bindingCalled`.

use std::collections::HashSet;
use std::time::Duration;

use rxscope_core::TelemetryEvent;
use rxscope_protocol::message::{code, event, method};
use rxscope_protocol::{
    encode_line, qualified, AddBindingParams, BindingCalledParams, EvaluateParams, Event,
    ProtocolError, ReadyPayload, Request, Response, RuntimeCommand, SubscribeParams, TelemetryPayload,
    AGENT_DOMAIN, READY_BINDING, RUNTIME_DOMAIN, TELEMETRY_BINDING,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::AgentError;
use crate::bridge::RuntimeHandle;

/// Maximum frame size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a rejected controller has to send its first request
const REJECT_READ_TIMEOUT: Duration = Duration::from_secs(2);

const BUSY_MESSAGE: &str = "Another controller is attached to this process";

/// Why a single request failed; reported back as an error response.
#[derive(Debug, thiserror::Error)]
enum RequestFailure {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),
}

impl RequestFailure {
    fn code(&self) -> i64 {
        match self {
            Self::MethodNotFound(_) => code::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => code::INVALID_PARAMS,
            Self::Evaluation(_) => code::SERVER_ERROR,
        }
    }
}

/// State of one controller connection.
pub struct AgentConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: BufWriter<OwnedWriteHalf>,
    runtime: RuntimeHandle,

    /// `Runtime.enable` was received
    runtime_enabled: bool,

    /// Bindings installed via `Runtime.addBinding`
    bindings: HashSet<String>,

    /// Events subscribed via `Agent.subscribe`
    subscriptions: HashSet<String>,

    ready_announced: bool,
    connection_number: u64,
}

impl AgentConnection {
    pub fn new(stream: TcpStream, runtime: RuntimeHandle, connection_number: u64) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer: BufWriter::new(writer),
            runtime,
            runtime_enabled: false,
            bindings: HashSet::new(),
            subscriptions: HashSet::new(),
            ready_announced: false,
            connection_number,
        }
    }

    /// Turns away a controller while another one is attached.
    ///
    /// The first request is answered with a server error so the controller
    /// fails its attach instead of waiting; the stream is closed after.
    pub async fn reject(stream: TcpStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut writer = BufWriter::new(writer);

        let request = match timeout(REJECT_READ_TIMEOUT, lines.next_line()).await {
            Ok(Ok(Some(line))) => serde_json::from_str::<Request>(&line).ok(),
            _ => None,
        };

        if let Some(request) = request {
            let response = Response::failure(request.id, code::SERVER_ERROR, BUSY_MESSAGE);
            match encode_line(&response) {
                Ok(line) => {
                    let sent = timeout(WRITE_TIMEOUT, async {
                        writer.write_all(line.as_bytes()).await?;
                        writer.flush().await
                    })
                    .await;
                    if !matches!(sent, Ok(Ok(()))) {
                        debug!(connection = connection_number, "Could not deliver rejection");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode rejection"),
            }
        }

        if let Err(e) = writer.shutdown().await {
            trace!(connection = connection_number, error = %e, "Shutdown after rejection failed");
        }
        debug!(connection = connection_number, "Rejected controller connection");
    }

    /// Serves the connection until EOF, an I/O failure or cancellation.
    ///
    /// Telemetry arriving on `telemetry` while the connection is up is
    /// pushed to the controller if it asked for it, dropped otherwise.
    pub async fn run(
        mut self,
        telemetry: &mut mpsc::UnboundedReceiver<TelemetryEvent>,
        cancel_token: &CancellationToken,
    ) {
        if let Err(e) = self.process(telemetry, cancel_token).await {
            debug!(connection = self.connection_number, error = %e, "Connection closed");
        }
    }

    async fn process(
        &mut self,
        telemetry: &mut mpsc::UnboundedReceiver<TelemetryEvent>,
        cancel_token: &CancellationToken,
    ) -> Result<(), AgentError> {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => return Ok(()),

                line = self.lines.next_line() => {
                    match line.map_err(|e| AgentError::Io(e.to_string()))? {
                        Some(line) => self.handle_line(&line).await?,
                        None => {
                            debug!(connection = self.connection_number, "Controller sent EOF");
                            return Ok(());
                        }
                    }
                }

                Some(telemetry_event) = telemetry.recv() => {
                    self.push_telemetry(&telemetry_event).await?;
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), AgentError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        if line.len() > MAX_MESSAGE_SIZE {
            warn!(size = line.len(), max = MAX_MESSAGE_SIZE, "Dropping oversized frame");
            return Ok(());
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(connection = self.connection_number, error = %e, "Unparsable request");
                return Ok(());
            }
        };

        trace!(id = request.id, method = %request.method, "Received request");

        let response = match self.handle_request(&request) {
            Ok(result) => Response::success(request.id, result),
            Err(failure) => {
                debug!(id = request.id, method = %request.method, error = %failure, "Request failed");
                Response::failure(request.id, failure.code(), failure.to_string())
            }
        };
        self.send_frame(&response).await?;

        self.announce_ready().await
    }

    fn handle_request(&mut self, request: &Request) -> Result<Value, RequestFailure> {
        match request.domain_and_name() {
            Some((RUNTIME_DOMAIN, method::ENABLE)) => {
                self.runtime_enabled = true;
                Ok(json!({}))
            }

            Some((RUNTIME_DOMAIN, method::ADD_BINDING)) => {
                let params: AddBindingParams = parse_params(&request.params)?;
                debug!(binding = %params.name, "Binding added");
                self.bindings.insert(params.name);
                Ok(json!({}))
            }

            Some((RUNTIME_DOMAIN, method::EVALUATE)) => {
                let params: EvaluateParams = parse_params(&request.params)?;
                let command = RuntimeCommand::parse_expression(&params.expression)
                    .map_err(|e| RequestFailure::Evaluation(e.to_string()))?;
                self.runtime.execute(command);
                Ok(json!({ "result": { "type": "undefined" } }))
            }

            Some((AGENT_DOMAIN, method::SUBSCRIBE)) => {
                let params: SubscribeParams = parse_params(&request.params)?;
                debug!(events = ?params.events, "Events subscribed");
                self.subscriptions.extend(params.events);
                Ok(json!({}))
            }

            _ => Err(RequestFailure::MethodNotFound(request.method.clone())),
        }
    }

    /// Whether binding events for `binding` may be pushed.
    fn binding_active(&self, binding: &str) -> bool {
        self.runtime_enabled
            && self.bindings.contains(binding)
            && self
                .subscriptions
                .contains(&qualified(RUNTIME_DOMAIN, event::BINDING_CALLED))
    }

    async fn announce_ready(&mut self) -> Result<(), AgentError> {
        if self.ready_announced || !self.binding_active(READY_BINDING) {
            return Ok(());
        }
        self.ready_announced = true;

        let payload = ReadyPayload::current().encode()?;
        debug!(connection = self.connection_number, "Announcing runtime ready");
        self.send_binding_called(READY_BINDING, payload).await
    }

    async fn push_telemetry(&mut self, telemetry: &TelemetryEvent) -> Result<(), AgentError> {
        if !self.binding_active(TELEMETRY_BINDING) {
            trace!(operator = %telemetry.operator(), "Telemetry binding inactive, dropping event");
            return Ok(());
        }
        let payload = TelemetryPayload::encode(telemetry)?;
        self.send_binding_called(TELEMETRY_BINDING, payload).await
    }

    async fn send_binding_called(&mut self, name: &str, payload: String) -> Result<(), AgentError> {
        let params = BindingCalledParams {
            name: name.to_string(),
            payload,
        };
        let frame = Event::new(
            qualified(RUNTIME_DOMAIN, event::BINDING_CALLED),
            serde_json::to_value(params).map_err(ProtocolError::from)?,
        );
        self.send_frame(&frame).await
    }

    async fn send_frame<T: Serialize>(&mut self, frame: &T) -> Result<(), AgentError> {
        let line = encode_line(frame)?;
        let writer = &mut self.writer;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AgentError::Io(e.to_string())),
            Err(_) => Err(AgentError::WriteTimeout),
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, RequestFailure> {
    serde_json::from_value(params.clone()).map_err(|e| RequestFailure::InvalidParams(e.to_string()))
}
