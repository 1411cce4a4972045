//! Kinds of observed process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The flavor of runtime an observed process reports when it becomes ready.
///
/// A process that reports something unrecognized is treated as unknown
/// (`Option::None`), never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFlavor {
    /// A natively compiled process.
    Native,
    /// A WebAssembly host.
    Wasm,
}

impl RuntimeFlavor {
    /// The flavor of the current build target.
    pub const fn current() -> Self {
        if cfg!(target_family = "wasm") {
            Self::Wasm
        } else {
            Self::Native
        }
    }

    /// Parses from a flavor name; unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "native" => Some(Self::Native),
            "wasm" => Some(Self::Wasm),
            _ => None,
        }
    }
}

impl fmt::Display for RuntimeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Wasm => write!(f, "wasm"),
        }
    }
}
