//! rxscope demo - an observed process with an instrumented pipeline
//!
//! Starts the debug agent, installs instrumentation and pushes a few
//! values through `take(4) → map(x * 2) → map(x * 20)` on every tick. The
//! operator keys are printed at startup so they can be enabled from the
//! controller.
//!
//! # Usage
//!
//! ```bash
//! # Terminal 1
//! rxscope-demo --address 127.0.0.1:9329
//!
//! # Terminal 2
//! rxscope watch --address 127.0.0.1:9329 --enable '<printed key>'
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use rxscope_protocol::{AGENT_ADDRESS_ENV, DEFAULT_AGENT_ADDRESS};
use rxscope_runtime::stream::{from_iter, map, take};
use rxscope_runtime::{
    CallSite, Observable, Observer, Operator, PathResolver, RuntimeConfig, RuntimeContext,
    SourceResolver, StreamError,
};
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// rxscope demo - emits values through an observed pipeline
#[derive(Parser, Debug)]
#[command(name = "rxscope-demo", version, about)]
struct Args {
    /// Address the agent listens on (default: $RXSCOPE_AGENT_ADDR or 127.0.0.1:9329)
    #[arg(short, long)]
    address: Option<String>,

    /// Root that source paths are resolved against
    #[arg(long)]
    source_root: Option<PathBuf>,

    /// Milliseconds between pipeline runs
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,
}

/// Logs whatever reaches the end of the pipeline.
struct LogObserver;

impl Observer<i32> for LogObserver {
    fn next(&mut self, value: i32) {
        debug!(value, "Pipeline emitted");
    }

    fn error(&mut self, error: StreamError) {
        warn!(error = %error, "Pipeline failed");
    }

    fn complete(&mut self) {
        debug!("Pipeline completed");
    }
}

/// Pipes through the installed composer and reports the call site the
/// composer saw.
#[track_caller]
fn pipe_reporting_site(
    source: &Observable<i32>,
    operators: Vec<Operator<i32>>,
) -> (Observable<i32>, CallSite) {
    (source.pipe(operators), CallSite::caller())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rxscope_demo=debug".parse()?)
                .add_directive("rxscope_runtime=info".parse()?),
        )
        .init();

    let address = args
        .address
        .or_else(|| std::env::var(AGENT_ADDRESS_ENV).ok().filter(|a| !a.is_empty()))
        .unwrap_or_else(|| DEFAULT_AGENT_ADDRESS.to_string());

    let mut config = RuntimeConfig::new(address);
    config.source_root = args.source_root;
    let resolver = match &config.source_root {
        Some(root) => PathResolver::new(root),
        None => PathResolver::unmapped(),
    };

    let context = RuntimeContext::start(config).await?;
    context.install()?;
    info!(address = %context.local_addr(), "Demo agent listening");

    let source = from_iter(vec![1, 2, 3, 4, 5]);
    let operators = vec![take(4), map(|x: i32| x * 2), map(|x: i32| x * 20)];
    let names: Vec<&str> = operators.iter().map(Operator::name).collect();
    let (pipeline, site) = pipe_reporting_site(&source, operators);

    for (index, name) in (0u32..).zip(names) {
        let identifier = resolver.resolve(&site, index).await;
        println!("{name:>6}  {}", identifier.key());
    }

    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                pipeline.subscribe(LogObserver);
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Error waiting for Ctrl+C");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    context.shutdown().await;
    Ok(())
}
