//! Per-request and fleet-wide status rollups.

use nodepulse_common::{CheckCategory, CheckResult, CheckStatus, NodeCheck, NodeCheckSpec};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts per status bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub warning: usize,
    pub critical: usize,
    pub unknown: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Healthy => self.healthy += 1,
            CheckStatus::Warning => self.warning += 1,
            CheckStatus::Critical => self.critical += 1,
            CheckStatus::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, status: CheckStatus) -> usize {
        match status {
            CheckStatus::Healthy => self.healthy,
            CheckStatus::Warning => self.warning,
            CheckStatus::Critical => self.critical,
            CheckStatus::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.warning + self.critical + self.unknown
    }
}

/// One request's rolled-up view for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub node: String,
    pub overall: CheckStatus,
    pub last_run: Option<String>,
    pub agent: Option<String>,
    pub probes: usize,
}

/// One request's full view: spec plus every published result with its
/// structured details reconstructed from the flattened wire form.
#[derive(Debug, Clone, Serialize)]
pub struct CheckDetail {
    pub name: String,
    pub spec: NodeCheckSpec,
    pub overall: CheckStatus,
    pub last_run: Option<String>,
    pub agent: Option<String>,
    pub results: Vec<ProbeResult>,
}

/// One probe's reconstructed result within a [`CheckDetail`].
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub category: CheckCategory,
    pub probe: String,
    #[serde(flatten)]
    pub result: CheckResult,
}

/// Per-probe fleet view: how each named probe fares across all nodes.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeBreakdown {
    pub category: String,
    pub probe: String,
    pub worst: CheckStatus,
    pub counts: StatusCounts,
}

/// Fleet-wide aggregate across all active (non-wildcard) requests.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub overall: CheckStatus,
    pub requests: StatusCounts,
    pub probes: Vec<ProbeBreakdown>,
}

/// Summarize one request. Requests never yet visited by an agent roll up
/// Unknown, not Healthy.
pub fn summarize(check: &NodeCheck) -> CheckSummary {
    let status = check.status.as_ref();
    CheckSummary {
        name: check.metadata.name.clone().unwrap_or_default(),
        node: check.spec.node.clone(),
        overall: status
            .map(|s| s.rollup())
            .unwrap_or(CheckStatus::Unknown),
        last_run: status.and_then(|s| s.last_run.clone()),
        agent: status.and_then(|s| s.agent.clone()),
        probes: status.map(|s| s.iter_results().count()).unwrap_or(0),
    }
}

/// Expand one request into its full view, re-parsing every result's
/// flattened details back into structured values.
pub fn detail(check: &NodeCheck) -> CheckDetail {
    let status = check.status.as_ref();
    CheckDetail {
        name: check.metadata.name.clone().unwrap_or_default(),
        spec: check.spec.clone(),
        overall: status
            .map(|s| s.rollup())
            .unwrap_or(CheckStatus::Unknown),
        last_run: status.and_then(|s| s.last_run.clone()),
        agent: status.and_then(|s| s.agent.clone()),
        results: status
            .map(|s| {
                s.iter_results()
                    .map(|(category, probe, flat)| ProbeResult {
                        category,
                        probe: probe.clone(),
                        result: flat.to_result(),
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Full scan-and-fold over all requests. Wildcard templates are fan-out
/// bookkeeping, never observations, and are excluded from every count.
pub fn fleet_summary(checks: &[NodeCheck]) -> FleetSummary {
    let mut requests = StatusCounts::default();
    let mut per_probe: BTreeMap<(String, String), (CheckStatus, StatusCounts)> = BTreeMap::new();
    let mut overall = Vec::new();

    for check in checks.iter().filter(|c| !c.is_wildcard()) {
        let rollup = check
            .status
            .as_ref()
            .map(|s| s.rollup())
            .unwrap_or(CheckStatus::Unknown);
        requests.record(rollup);
        overall.push(rollup);

        if let Some(status) = &check.status {
            for (category, probe, result) in status.iter_results() {
                let entry = per_probe
                    .entry((category.as_str().to_string(), probe.clone()))
                    .or_insert((CheckStatus::Healthy, StatusCounts::default()));
                entry.0 = entry.0.worse(result.status);
                entry.1.record(result.status);
            }
        }
    }

    FleetSummary {
        overall: CheckStatus::worst_of(overall),
        requests,
        probes: per_probe
            .into_iter()
            .map(|((category, probe), (worst, counts))| ProbeBreakdown {
                category,
                probe,
                worst,
                counts,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodepulse_common::{
        CheckCategory, CheckResult, NodeCheckSpec, NodeCheckStatus, ResultBundle,
    };

    fn check_with(name: &str, node: &str, status: Option<NodeCheckStatus>) -> NodeCheck {
        let mut check = NodeCheck::new(
            name,
            NodeCheckSpec {
                node: node.to_string(),
                ..NodeCheckSpec::default()
            },
        );
        check.metadata.name = Some(name.to_string());
        check.status = status;
        check
    }

    fn status_of(entries: &[(CheckCategory, &str, CheckStatus)]) -> NodeCheckStatus {
        let mut bundle = ResultBundle::new();
        for (category, probe, status) in entries {
            bundle.insert(
                *category,
                *probe,
                CheckResult::new(*status, "msg", "cmd"),
            );
        }
        bundle.to_status("test-agent")
    }

    #[test]
    fn fleet_overall_is_worst_with_per_status_counts() {
        let checks = vec![
            check_with(
                "a",
                "worker-1",
                Some(status_of(&[(CheckCategory::System, "cpu_load", CheckStatus::Healthy)])),
            ),
            check_with(
                "b",
                "worker-2",
                Some(status_of(&[(CheckCategory::Disk, "filesystem_usage", CheckStatus::Warning)])),
            ),
            check_with(
                "c",
                "worker-3",
                Some(status_of(&[(CheckCategory::Hardware, "sensors", CheckStatus::Critical)])),
            ),
        ];
        let fleet = fleet_summary(&checks);
        assert_eq!(fleet.overall, CheckStatus::Critical);
        assert_eq!(
            fleet.requests,
            StatusCounts { healthy: 1, warning: 1, critical: 1, unknown: 0 }
        );
    }

    #[test]
    fn wildcard_templates_excluded_from_counts() {
        let checks = vec![
            check_with("all", "*", None),
            check_with(
                "a",
                "worker-1",
                Some(status_of(&[(CheckCategory::System, "cpu_load", CheckStatus::Healthy)])),
            ),
        ];
        let fleet = fleet_summary(&checks);
        assert_eq!(fleet.requests.total(), 1);
        assert_eq!(fleet.overall, CheckStatus::Healthy);
    }

    #[test]
    fn unvisited_request_counts_as_unknown() {
        let fleet = fleet_summary(&[check_with("new", "worker-9", None)]);
        assert_eq!(fleet.requests.unknown, 1);
        assert_eq!(fleet.overall, CheckStatus::Unknown);
        assert_eq!(summarize(&check_with("new", "worker-9", None)).overall, CheckStatus::Unknown);
    }

    #[test]
    fn detail_reconstructs_structured_details() {
        let mut bundle = ResultBundle::new();
        bundle.insert(
            CheckCategory::Disk,
            "filesystem_usage",
            CheckResult::warning("/var at 87%", "df -P").with_detail(
                "mounts",
                serde_json::json!([{"mount": "/var", "use_percent": 87}]),
            ),
        );
        let check = check_with("a", "worker-1", Some(bundle.to_status("worker-1")));

        let view = detail(&check);
        assert_eq!(view.overall, CheckStatus::Warning);
        assert_eq!(view.results.len(), 1);
        // details come back as values, not the flattened wire strings
        assert_eq!(
            view.results[0].result.details["mounts"],
            serde_json::json!([{"mount": "/var", "use_percent": 87}])
        );

        let serialized = serde_json::to_value(&view).unwrap();
        assert!(serialized["results"][0]["details"]["mounts"].is_array());
    }

    #[test]
    fn per_probe_breakdown_tracks_worst_and_counts() {
        let checks = vec![
            check_with(
                "a",
                "worker-1",
                Some(status_of(&[(CheckCategory::Disk, "smart_health", CheckStatus::Healthy)])),
            ),
            check_with(
                "b",
                "worker-2",
                Some(status_of(&[(CheckCategory::Disk, "smart_health", CheckStatus::Critical)])),
            ),
        ];
        let fleet = fleet_summary(&checks);
        let probe = fleet
            .probes
            .iter()
            .find(|p| p.probe == "smart_health")
            .unwrap();
        assert_eq!(probe.category, "disk");
        assert_eq!(probe.worst, CheckStatus::Critical);
        assert_eq!(probe.counts.healthy, 1);
        assert_eq!(probe.counts.critical, 1);
    }
}
