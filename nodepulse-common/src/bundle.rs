//! Per-request result bundle and its wire form on the NodeCheck status.

use crate::details::{flatten_details, reconstruct_details};
use crate::result::CheckResult;
use crate::status::CheckStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Probe categories; each maps to one executor and one toggle on the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckCategory {
    System,
    Hardware,
    Disk,
    Network,
    Kubernetes,
}

impl CheckCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckCategory::System => "system",
            CheckCategory::Hardware => "hardware",
            CheckCategory::Disk => "disk",
            CheckCategory::Network => "network",
            CheckCategory::Kubernetes => "kubernetes",
        }
    }

    pub fn all() -> [CheckCategory; 5] {
        [
            CheckCategory::System,
            CheckCategory::Hardware,
            CheckCategory::Disk,
            CheckCategory::Network,
            CheckCategory::Kubernetes,
        ]
    }
}

/// Wire form of a [`CheckResult`]: details flattened to strings so the CRD
/// schema stays `map<string, string>`. See the `details` module for the
/// flatten/reconstruct convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlatCheckResult {
    pub status: CheckStatus,
    pub message: String,
    pub timestamp: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl FlatCheckResult {
    pub fn from_result(result: &CheckResult) -> Self {
        Self {
            status: result.status,
            message: result.message.clone(),
            timestamp: result.timestamp.clone(),
            command: result.command.clone(),
            details: flatten_details(&result.details),
        }
    }

    /// Rebuild the in-memory form, re-parsing structured details.
    pub fn to_result(&self) -> CheckResult {
        CheckResult {
            status: self.status,
            message: self.message.clone(),
            timestamp: self.timestamp.clone(),
            command: self.command.clone(),
            details: reconstruct_details(&self.details),
        }
    }
}

/// Published status of a NodeCheck: one map of named results per category,
/// plus the rollup. Written exclusively by the agent on the target node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeCheckStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub system: BTreeMap<String, FlatCheckResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hardware: BTreeMap<String, FlatCheckResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub disk: BTreeMap<String, FlatCheckResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub network: BTreeMap<String, FlatCheckResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kubernetes: BTreeMap<String, FlatCheckResult>,
}

impl NodeCheckStatus {
    fn category_map(&self, category: CheckCategory) -> &BTreeMap<String, FlatCheckResult> {
        match category {
            CheckCategory::System => &self.system,
            CheckCategory::Hardware => &self.hardware,
            CheckCategory::Disk => &self.disk,
            CheckCategory::Network => &self.network,
            CheckCategory::Kubernetes => &self.kubernetes,
        }
    }

    /// Iterate every published result with its category and probe name.
    pub fn iter_results(
        &self,
    ) -> impl Iterator<Item = (CheckCategory, &String, &FlatCheckResult)> {
        CheckCategory::all().into_iter().flat_map(move |category| {
            self.category_map(category)
                .iter()
                .map(move |(name, result)| (category, name, result))
        })
    }

    /// Worst status across all published results; a bundle with none is
    /// `Unknown` because nothing was observed yet.
    pub fn rollup(&self) -> CheckStatus {
        CheckStatus::worst_of(self.iter_results().map(|(_, _, result)| result.status))
    }
}

/// In-memory collection an agent fills during one check cycle before
/// publishing. Each probe writes only its own named slot.
#[derive(Debug, Clone, Default)]
pub struct ResultBundle {
    results: BTreeMap<CheckCategory, BTreeMap<String, CheckResult>>,
}

impl ResultBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: CheckCategory, name: impl Into<String>, result: CheckResult) {
        self.results
            .entry(category)
            .or_default()
            .insert(name.into(), result);
    }

    pub fn len(&self) -> usize {
        self.results.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (CheckCategory, &String, &CheckResult)> {
        self.results.iter().flat_map(|(category, probes)| {
            probes.iter().map(move |(name, result)| (*category, name, result))
        })
    }

    /// Worst status across collected results.
    pub fn overall(&self) -> CheckStatus {
        CheckStatus::worst_of(self.iter().map(|(_, _, result)| result.status))
    }

    /// Flatten into the wire form for the status subresource.
    pub fn to_status(&self, agent: impl Into<String>) -> NodeCheckStatus {
        let mut status = NodeCheckStatus {
            overall: Some(self.overall()),
            last_run: Some(chrono::Utc::now().to_rfc3339()),
            agent: Some(agent.into()),
            ..NodeCheckStatus::default()
        };
        for (category, name, result) in self.iter() {
            let flat = FlatCheckResult::from_result(result);
            let map = match category {
                CheckCategory::System => &mut status.system,
                CheckCategory::Hardware => &mut status.hardware,
                CheckCategory::Disk => &mut status.disk,
                CheckCategory::Network => &mut status.network,
                CheckCategory::Kubernetes => &mut status.kubernetes,
            };
            map.insert(name.clone(), flat);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_rollup_is_worst_status() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::System,
            "cpu_load",
            CheckResult::healthy("load ok", "/proc/loadavg"),
        );
        bundle.insert(
            CheckCategory::Disk,
            "filesystem_usage",
            CheckResult::warning("/var at 87%", "df -P"),
        );
        assert_eq!(bundle.overall(), CheckStatus::Warning);

        bundle.insert(
            CheckCategory::Hardware,
            "sensors",
            CheckResult::critical("cpu at 99C", "sensors"),
        );
        assert_eq!(bundle.overall(), CheckStatus::Critical);
    }

    #[test]
    fn empty_bundle_rolls_up_unknown() {
        assert_eq!(ResultBundle::new().overall(), CheckStatus::Unknown);
    }

    #[test]
    fn to_status_flattens_nested_details() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::Disk,
            "filesystem_usage",
            CheckResult::healthy("all under 85%", "df -P").with_detail(
                "mounts",
                json!([{"mount": "/", "use_percent": 42}]),
            ),
        );
        let status = bundle.to_status("worker-1");

        let flat = &status.disk["filesystem_usage"];
        assert!(flat.details["mounts"].starts_with('['));

        let rebuilt = flat.to_result();
        assert_eq!(
            rebuilt.details["mounts"],
            json!([{"mount": "/", "use_percent": 42}])
        );
        assert_eq!(status.overall, Some(CheckStatus::Healthy));
        assert_eq!(status.rollup(), CheckStatus::Healthy);
    }

    #[test]
    fn iter_results_covers_all_categories() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::Network,
            "routes",
            CheckResult::healthy("default route present", "ip route"),
        );
        bundle.insert(
            CheckCategory::Kubernetes,
            "node_ready",
            CheckResult::healthy("Ready", "nodes/worker-1"),
        );
        let status = bundle.to_status("worker-1");
        let seen: Vec<_> = status
            .iter_results()
            .map(|(category, name, _)| (category, name.clone()))
            .collect();
        assert!(seen.contains(&(CheckCategory::Network, "routes".to_string())));
        assert!(seen.contains(&(CheckCategory::Kubernetes, "node_ready".to_string())));
        assert_eq!(seen.len(), 2);
    }
}
