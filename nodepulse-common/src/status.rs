//! Health status classification shared by every probe and rollup.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome classification for a single probe or a rollup of probes.
///
/// `Unknown` means "could not determine" (tool missing, API unreachable,
/// output unparseable) and is distinct from `Healthy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum CheckStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl CheckStatus {
    /// Severity used for worst-status rollups: Critical > Warning > Unknown > Healthy.
    pub fn severity(&self) -> u8 {
        match self {
            CheckStatus::Critical => 3,
            CheckStatus::Warning => 2,
            CheckStatus::Unknown => 1,
            CheckStatus::Healthy => 0,
        }
    }

    /// The more severe of two statuses.
    pub fn worse(self, other: CheckStatus) -> CheckStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Worst status over an iterator; an empty iterator yields `Unknown`
    /// because nothing was observed.
    pub fn worst_of<I: IntoIterator<Item = CheckStatus>>(statuses: I) -> CheckStatus {
        let mut worst = None;
        for status in statuses {
            worst = Some(match worst {
                Some(w) => status.worse(w),
                None => status,
            });
        }
        worst.unwrap_or(CheckStatus::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Healthy => "Healthy",
            CheckStatus::Warning => "Warning",
            CheckStatus::Critical => "Critical",
            CheckStatus::Unknown => "Unknown",
        }
    }

    /// All defined statuses, in severity order (least severe first).
    pub fn all() -> [CheckStatus; 4] {
        [
            CheckStatus::Healthy,
            CheckStatus::Unknown,
            CheckStatus::Warning,
            CheckStatus::Critical,
        ]
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
