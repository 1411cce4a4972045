//! rxscope Runtime - The observed process's side of rxscope
//!
//! This crate provides:
//! - Push-based reactive streams ([`stream`]) and the composition
//!   capability every `pipe` call goes through ([`compose`])
//! - The instrumentation decorator that records operator lifecycles
//!   ([`instrument`]) and resolves their source identity ([`resolve`])
//! - The runtime-side bridge holding the enabled log points ([`bridge`])
//! - The debug agent the controller connects to ([`agent`])
//!
//! A typical program calls [`init_from_env`] once; when launched with
//! `RXSCOPE_AGENT_ADDR` set this starts the agent and installs
//! instrumentation, otherwise it does nothing and pipelines run directly.

pub mod agent;
pub mod bridge;
pub mod compose;
pub mod context;
pub mod error;
pub mod instrument;
pub mod resolve;
pub mod stream;

pub use agent::{AgentError, DebugAgent, DEFAULT_AGENT_ADDRESS};
pub use bridge::{RuntimeBridge, RuntimeHandle};
pub use compose::{install, CallSite, Compose, Direct};
pub use context::{init_from_env, RuntimeConfig, RuntimeContext};
pub use error::RuntimeError;
pub use instrument::Instrumented;
pub use resolve::{PathResolver, SourceResolver};
pub use stream::{Observable, Observer, Operator, StreamError, Subscriber, Subscription};
