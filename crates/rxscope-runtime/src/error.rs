//! Error types for the runtime side.

use thiserror::Error;

use crate::agent::AgentError;

/// Errors raised while setting up instrumentation in the observed process.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// An instrumented composer is already installed in this process.
    #[error("Instrumentation is already installed")]
    AlreadyInstalled,

    /// Instrumentation needs a tokio runtime to run its probe tasks.
    #[error("No tokio runtime is running")]
    NoTokioRuntime,

    /// The debug agent failed.
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_is_wrapped() {
        let err: RuntimeError = AgentError::Bind {
            address: "127.0.0.1:1".to_string(),
            error: "in use".to_string(),
        }
        .into();
        assert!(err.to_string().contains("127.0.0.1:1"));
        assert!(err.to_string().contains("in use"));
    }
}
