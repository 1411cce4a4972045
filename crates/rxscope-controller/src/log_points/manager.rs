//! Enabled log point bookkeeping.
//!
//! Plain synchronous state; the actor owns one instance and decides when
//! to publish changes.

use std::collections::BTreeMap;

use rxscope_core::{merge, LogPoint, OperatorIdentifier, Range, Recommendations};
use tracing::debug;

/// The enabled log points, keyed by identifier key.
#[derive(Debug, Default)]
pub struct LogPointManager {
    enabled: BTreeMap<String, LogPoint>,
}

impl LogPointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `log_point`. Returns `false` if its key was already enabled.
    pub fn enable(&mut self, log_point: LogPoint) -> bool {
        let key = log_point.key();
        if self.enabled.contains_key(&key) {
            return false;
        }
        debug!(%key, "Log point enabled");
        self.enabled.insert(key, log_point.with_enabled(true));
        true
    }

    /// Disables the log point for `identifier`. Returns `false` if it was
    /// not enabled.
    pub fn disable(&mut self, identifier: &OperatorIdentifier) -> bool {
        let removed = self.enabled.remove(&identifier.key()).is_some();
        if removed {
            debug!(key = %identifier.key(), "Log point disabled");
        }
        removed
    }

    /// Flips `log_point` and returns its new enabled state.
    pub fn toggle(&mut self, log_point: LogPoint) -> bool {
        if self.disable(&log_point.identifier) {
            false
        } else {
            self.enable(log_point)
        }
    }

    pub fn log_points(&self) -> Vec<LogPoint> {
        self.enabled.values().cloned().collect()
    }

    pub fn log_point_for_identifier(&self, identifier: &OperatorIdentifier) -> Option<LogPoint> {
        self.enabled.get(&identifier.key()).cloned()
    }

    /// Enabled log points located in `file` inside `range`.
    pub fn log_points_for_selection(&self, file: &str, range: Range) -> Vec<LogPoint> {
        self.enabled
            .values()
            .filter(|point| point.location.file == file && range.contains(point.location.position))
            .cloned()
            .collect()
    }

    /// Replaces the enabled points of `recommendations.file` with the merge
    /// of the previous ones and the new generation. Other files keep their
    /// points. Returns the points of that file that survived.
    pub fn refresh(&mut self, recommendations: Recommendations) -> Vec<LogPoint> {
        let file = recommendations.file.as_str();
        let previous: Vec<LogPoint> = self
            .enabled
            .values()
            .filter(|point| point.identifier.file_name == file)
            .cloned()
            .collect();

        self.enabled
            .retain(|_, point| point.identifier.file_name != file);

        let merged = merge(&previous, &recommendations.log_points);
        for point in &merged {
            self.enabled.insert(point.key(), point.clone());
        }

        debug!(
            file,
            before = previous.len(),
            after = merged.len(),
            "Refreshed log points"
        );
        merged
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}
