//! Carrying enabled log points across source edits.
//!
//! After an edit the recommender produces a new generation of log points
//! whose positions may have shifted. [`merge`] decides which of the new
//! points inherit the user's enabled selection.
//!
//! Matching is by call site, operator name and operator index only. Two
//! operators with the same name that swap places inside one composition
//! call cannot be told apart.

use std::collections::HashMap;

use tracing::debug;

use crate::log_point::LogPoint;

/// (file name, call-site key)
type CallSite<'a> = (&'a str, String);

fn call_site(point: &LogPoint) -> CallSite<'_> {
    (
        point.identifier.file_name.as_str(),
        point.identifier.call_site_key(),
    )
}

/// Merges the previous generation of log points into the next one.
///
/// For every call site present in both generations, a point of `next` is
/// kept (and marked enabled) iff the previous group holds an enabled point
/// with the same operator name and operator index. Everything else is
/// dropped, including call sites that no longer exist in `next`.
///
/// The result preserves the order of `next`.
pub fn merge(prev: &[LogPoint], next: &[LogPoint]) -> Vec<LogPoint> {
    let mut previous: HashMap<CallSite<'_>, Vec<&LogPoint>> = HashMap::new();
    for point in prev {
        previous.entry(call_site(point)).or_default().push(point);
    }

    let merged: Vec<LogPoint> = next
        .iter()
        .filter(|candidate| {
            previous.get(&call_site(candidate)).is_some_and(|group| {
                group.iter().any(|old| {
                    old.enabled
                        && old.operator_name == candidate.operator_name
                        && old.identifier.operator_index == candidate.identifier.operator_index
                })
            })
        })
        .map(|candidate| candidate.with_enabled(true))
        .collect();

    debug!(
        previous = prev.len(),
        recommended = next.len(),
        kept = merged.len(),
        "Merged log point generations"
    );

    merged
}
