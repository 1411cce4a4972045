//! rxscope - watch operator telemetry of a running process
//!
//! Attaches to the debug agent of an observed process, enables the given
//! log points and prints every telemetry event until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Watch two operators
//! rxscope watch --address 127.0.0.1:9329 \
//!     --enable 'src/main.rs-41:8-1' --enable 'src/main.rs-41:8-2'
//!
//! # Print the effective configuration
//! rxscope show-config
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rxscope_controller::config::default_path;
use rxscope_controller::{
    spawn_log_point_manager, spawn_session_manager, ControllerConfig, DebugSessionStarted,
    SessionNotification,
};
use rxscope_core::{LogPoint, OperatorIdentifier, Position, SourceLocation};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Session id used for the single session this tool drives.
const SESSION_ID: &str = "rxscope-cli";

/// rxscope - operator-level telemetry for reactive pipelines
#[derive(Parser, Debug)]
#[command(name = "rxscope", version, about)]
struct Args {
    /// Config file (default: <config dir>/rxscope/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach to an agent and print telemetry
    Watch {
        /// Agent address (default: from config)
        #[arg(short, long)]
        address: Option<String>,

        /// Operator to enable, as `<file>-<line>:<character>-<index>`
        #[arg(short, long = "enable", value_name = "KEY")]
        enable: Vec<String>,

        /// Debug session kind to report
        #[arg(long, default_value = "rust")]
        kind: String,
    },
    /// Print the effective configuration
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<ControllerConfig> {
    let config = match path {
        Some(path) => ControllerConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ControllerConfig::load_default().context("Failed to load default config")?,
    };
    Ok(config.with_env_overrides())
}

/// Turns a key into a log point located at its call site.
fn log_point_from_key(key: &str) -> Result<LogPoint> {
    let identifier =
        OperatorIdentifier::from_str(key).with_context(|| format!("Invalid operator key '{key}'"))?;
    let location = SourceLocation::new(
        identifier.file_name.clone(),
        Position::new(identifier.line, identifier.character),
    );
    Ok(LogPoint::recommendation(location, identifier, None))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    match args.command {
        Command::ShowConfig => {
            if let Some(path) = args.config.or_else(default_path) {
                println!("# {}", path.display());
            }
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Watch {
            address,
            enable,
            kind,
        } => {
            let log_points = enable
                .iter()
                .map(|key| log_point_from_key(key))
                .collect::<Result<Vec<_>>>()?;
            let address = address.unwrap_or_else(|| config.agent_address.clone());
            watch(config, address, kind, log_points)
        }
    }
}

#[tokio::main]
async fn watch(
    config: ControllerConfig,
    address: String,
    kind: String,
    log_points: Vec<LogPoint>,
) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rxscope=info".parse()?)
                .add_directive("rxscope_controller=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let log_point_handle = spawn_log_point_manager(None);
    for log_point in log_points {
        log_point_handle.enable(log_point).await?;
    }

    let sessions = spawn_session_manager(config, log_point_handle);
    let mut notifications = sessions.subscribe();

    let event = DebugSessionStarted::new(SESSION_ID, kind.clone()).with_address(address.clone());
    if !sessions.session_started(event).await? {
        bail!("Session kind '{kind}' is not in supported_session_kinds");
    }

    let flavor = sessions
        .attach(SESSION_ID)
        .await
        .with_context(|| format!("Failed to attach to {address}"))?;
    match flavor {
        Some(flavor) => info!(%address, %flavor, "Attached"),
        None => info!(%address, "Attached to a runtime of unknown flavor"),
    }

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "Error waiting for shutdown signal");
                }
                break;
            }

            notification = notifications.recv() => match notification {
                Ok(SessionNotification::Telemetry { event, received_at, .. }) => {
                    println!("{} {event}", received_at.to_rfc3339());
                }
                Ok(SessionNotification::Terminated { .. }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, telemetry dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = sessions.session_terminated(SESSION_ID).await {
        warn!(error = %e, "Failed to end session");
    }
    info!("Detached");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
