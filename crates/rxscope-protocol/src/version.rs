//! Bridge protocol version, announced by the runtime when it becomes ready.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// `{major, minor}` as carried in the ready payload.
///
/// A major bump changes the command or telemetry encoding. A minor bump
/// only adds to it, so any two versions with the same major interoperate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// First published version; assumed for runtimes that do not announce one.
    pub const INITIAL: ProtocolVersion = ProtocolVersion { major: 1, minor: 0 };

    /// Version spoken by this build.
    pub const CURRENT: ProtocolVersion = Self::INITIAL;

    /// Checks that this side can talk to a `peer` announcing its version.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::MajorMismatch` if the majors differ.
    pub fn ensure_compatible(&self, peer: &ProtocolVersion) -> Result<(), VersionError> {
        if self.major == peer.major {
            return Ok(());
        }
        Err(VersionError::MajorMismatch {
            ours: *self,
            theirs: *peer,
        })
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("peer speaks protocol {theirs}, this side speaks {ours}")]
    MajorMismatch {
        ours: ProtocolVersion,
        theirs: ProtocolVersion,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(major: u16, minor: u16) -> ProtocolVersion {
        ProtocolVersion { major, minor }
    }

    #[test]
    fn test_minor_versions_interoperate() {
        assert!(ProtocolVersion::CURRENT
            .ensure_compatible(&version(1, 9))
            .is_ok());
        assert!(version(1, 9)
            .ensure_compatible(&ProtocolVersion::CURRENT)
            .is_ok());
    }

    #[test]
    fn test_major_mismatch_names_both_sides() {
        let err = ProtocolVersion::CURRENT
            .ensure_compatible(&version(2, 1))
            .unwrap_err();
        assert_eq!(err.to_string(), "peer speaks protocol 2.1, this side speaks 1.0");
    }

    #[test]
    fn test_missing_version_means_initial() {
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::INITIAL);
        assert!(version(1, 2) > ProtocolVersion::INITIAL);
    }
}
