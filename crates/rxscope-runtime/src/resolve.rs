//! Turning captured call sites into operator identifiers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rxscope_core::OperatorIdentifier;
use rxscope_protocol::SOURCE_ROOT_ENV;
use tracing::trace;

use crate::compose::CallSite;

/// Resolves where a composition call lives in the editor's view of the
/// source tree.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, site: &CallSite, operator_index: u32) -> OperatorIdentifier;
}

/// Maps compile-time paths onto a source root.
///
/// `file!()` paths are relative to the directory the compiler was invoked
/// from. When a source root is known, relative paths are joined onto it
/// and canonicalized; anything that fails to canonicalize keeps the
/// compile-time path.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    source_root: Option<PathBuf>,
}

impl PathResolver {
    /// Keeps compile-time paths as they are.
    pub fn unmapped() -> Self {
        Self::default()
    }

    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: Some(source_root.into()),
        }
    }

    /// Uses `RXSCOPE_SOURCE_ROOT` if set and non-empty.
    pub fn from_env() -> Self {
        match std::env::var(SOURCE_ROOT_ENV) {
            Ok(root) if !root.is_empty() => Self::new(root),
            _ => Self::unmapped(),
        }
    }

    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    async fn map_path(&self, file: &str) -> String {
        let Some(root) = &self.source_root else {
            return file.to_string();
        };

        let path = Path::new(file);
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        match tokio::fs::canonicalize(&candidate).await {
            Ok(resolved) => resolved.to_string_lossy().into_owned(),
            Err(e) => {
                trace!(file, candidate = %candidate.display(), error = %e, "Keeping unmapped source path");
                file.to_string()
            }
        }
    }
}

#[async_trait]
impl SourceResolver for PathResolver {
    async fn resolve(&self, site: &CallSite, operator_index: u32) -> OperatorIdentifier {
        let file_name = self.map_path(site.file).await;
        OperatorIdentifier::from_caller_location(file_name, site.line, site.column, operator_index)
    }
}
