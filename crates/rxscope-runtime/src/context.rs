//! Process-level wiring of the runtime side.
//!
//! [`RuntimeContext`] owns everything an observed process needs: the
//! runtime bridge, the telemetry channel feeding the agent, and the agent
//! task itself. Programs normally call [`init_from_env`] once at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rxscope_core::TelemetryEvent;
use rxscope_protocol::{AGENT_ADDRESS_ENV, SOURCE_ROOT_ENV};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{AgentError, DebugAgent};
use crate::bridge::{RuntimeBridge, RuntimeHandle};
use crate::compose::{self, Direct};
use crate::error::RuntimeError;
use crate::instrument::Instrumented;
use crate::resolve::{PathResolver, SourceResolver};

/// Settings for the runtime side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Address the agent listens on.
    pub agent_address: String,

    /// Root that compile-time source paths are resolved against.
    pub source_root: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn new(agent_address: impl Into<String>) -> Self {
        Self {
            agent_address: agent_address.into(),
            source_root: None,
        }
    }

    /// Reads `RXSCOPE_AGENT_ADDR` and `RXSCOPE_SOURCE_ROOT`.
    ///
    /// Returns `None` when no agent address is set, which means the process
    /// was not launched for observation.
    pub fn from_env() -> Option<Self> {
        let agent_address = std::env::var(AGENT_ADDRESS_ENV)
            .ok()
            .filter(|address| !address.trim().is_empty())?;
        let source_root = std::env::var(SOURCE_ROOT_ENV)
            .ok()
            .filter(|root| !root.is_empty())
            .map(PathBuf::from);

        Some(Self {
            agent_address,
            source_root,
        })
    }

    fn resolver(&self) -> PathResolver {
        match &self.source_root {
            Some(root) => PathResolver::new(root),
            None => PathResolver::unmapped(),
        }
    }
}

/// Running runtime side of one process.
pub struct RuntimeContext {
    runtime: RuntimeHandle,
    resolver: Arc<dyn SourceResolver>,
    local_addr: SocketAddr,
    served: Arc<AtomicU64>,
    cancel_token: CancellationToken,
    agent: JoinHandle<Result<(), AgentError>>,
}

impl RuntimeContext {
    /// Initializes the runtime bridge and starts the agent.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::Agent` if the agent cannot bind its address.
    pub async fn start(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel();
        let runtime = RuntimeBridge::init(move |event: &TelemetryEvent| {
            // The receiver only goes away when the agent has stopped.
            let _ = telemetry_tx.send(event.clone());
        });

        let cancel_token = CancellationToken::new();
        let agent = DebugAgent::bind(
            &config.agent_address,
            runtime.clone(),
            telemetry_rx,
            cancel_token.clone(),
        )
        .await?;
        let local_addr = agent.local_addr()?;
        let served = agent.served_connections();

        let agent = tokio::spawn(agent.run());
        info!(address = %local_addr, source_root = ?config.source_root, "Runtime context started");

        Ok(Self {
            runtime,
            resolver: Arc::new(config.resolver()),
            local_addr,
            served,
            cancel_token,
            agent,
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.clone()
    }

    /// Address the agent actually listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of controller connections the agent has served.
    pub fn controller_connections(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    /// Builds an instrumented composer feeding this context's bridge.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::NoTokioRuntime` outside a tokio runtime.
    pub fn instrumentation(&self) -> Result<Instrumented<Direct>, RuntimeError> {
        Instrumented::new(Direct, self.handle(), Arc::clone(&self.resolver))
    }

    /// Installs this context's instrumentation for every `pipe` call.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError::AlreadyInstalled` on a second installation.
    pub fn install(&self) -> Result<(), RuntimeError> {
        compose::install(self.instrumentation()?)
    }

    /// Stops the agent and tears the runtime bridge down.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        self.runtime.teardown();

        match self.agent.await {
            Ok(Ok(())) => debug!("Agent stopped"),
            Ok(Err(e)) => warn!(error = %e, "Agent stopped with error"),
            Err(e) => warn!(error = %e, "Agent task failed"),
        }
    }
}

/// Starts the runtime side if the process was launched for observation.
///
/// Returns `Ok(None)` when `RXSCOPE_AGENT_ADDR` is not set.
///
/// # Errors
///
/// Fails if the agent cannot start or instrumentation was installed before.
pub async fn init_from_env() -> Result<Option<RuntimeContext>, RuntimeError> {
    let Some(config) = RuntimeConfig::from_env() else {
        debug!(env = AGENT_ADDRESS_ENV, "Agent address not set, instrumentation disabled");
        return Ok(None);
    };

    // Checked before binding so a second call does not start another agent.
    if compose::is_installed() {
        warn!("Instrumentation already installed, not starting another agent");
        return Err(RuntimeError::AlreadyInstalled);
    }

    let context = RuntimeContext::start(config).await?;
    context.install()?;
    Ok(Some(context))
}
