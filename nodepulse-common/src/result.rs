//! In-memory probe result type.

use crate::status::CheckStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Probe-specific parsed fields: each probe records the fields it parsed,
/// plus bookkeeping like which data source answered.
pub type Details = BTreeMap<String, Value>;

/// Result of a single probe execution.
///
/// `status` is always set. `command` records the command (or file/API) the
/// data came from so operators can reproduce the observation by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
    pub timestamp: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: Details,
}

impl CheckResult {
    pub fn new(status: CheckStatus, message: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: command.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn healthy(message: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(CheckStatus::Healthy, message, command)
    }

    pub fn warning(message: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(CheckStatus::Warning, message, command)
    }

    pub fn critical(message: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(CheckStatus::Critical, message, command)
    }

    pub fn unknown(message: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(CheckStatus::Unknown, message, command)
    }

    /// Attach one parsed field.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// Attach a batch of parsed fields.
    pub fn with_details(mut self, details: Details) -> Self {
        self.details.extend(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_status() {
        assert_eq!(CheckResult::healthy("ok", "df -P").status, CheckStatus::Healthy);
        assert_eq!(CheckResult::warning("w", "df -P").status, CheckStatus::Warning);
        assert_eq!(CheckResult::critical("c", "df -P").status, CheckStatus::Critical);
        assert_eq!(CheckResult::unknown("u", "df -P").status, CheckStatus::Unknown);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let result = CheckResult::healthy("ok", "true");
        assert!(chrono::DateTime::parse_from_rfc3339(&result.timestamp).is_ok());
    }

    #[test]
    fn details_builder_accumulates() {
        let result = CheckResult::healthy("ok", "sensors")
            .with_detail("temp_celsius", 41.5)
            .with_detail("source", "host");
        assert_eq!(result.details["temp_celsius"], json!(41.5));
        assert_eq!(result.details["source"], json!("host"));
    }
}
