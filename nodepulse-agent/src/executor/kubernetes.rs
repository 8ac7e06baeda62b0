//! Orchestrator-level probes: node conditions, pod health on this node,
//! OpenShift cluster operators.
//!
//! These probes read the API server rather than the host. API failures
//! degrade the probe to Unknown; only the controller treats API errors as
//! hard failures.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::Client;
use log::debug;
use nodepulse_common::{CheckCategory, CheckResult, CheckStatus};
use serde_json::json;
use tokio::sync::OnceCell;

use super::Executor;

const PROBES: &[&str] = &["node_ready", "node_pressure", "pod_health", "cluster_operators"];

/// Containers restarting more than this many times get flagged even when
/// not currently in CrashLoopBackOff.
const RESTART_WARN_THRESHOLD: i32 = 20;

pub struct KubernetesExecutor {
    client: Client,
    node: String,
    // One-shot platform detection, computed on first use and cached for the
    // life of this executor.
    openshift: OnceCell<bool>,
}

impl KubernetesExecutor {
    pub fn new(client: Client, node: impl Into<String>) -> Self {
        Self {
            client,
            node: node.into(),
            openshift: OnceCell::new(),
        }
    }

    async fn is_openshift(&self) -> bool {
        *self
            .openshift
            .get_or_init(|| async {
                match self.client.list_api_groups().await {
                    Ok(groups) => groups
                        .groups
                        .iter()
                        .any(|g| g.name == "config.openshift.io"),
                    Err(e) => {
                        debug!("API group discovery failed: {}", e);
                        false
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl Executor for KubernetesExecutor {
    fn category(&self) -> CheckCategory {
        CheckCategory::Kubernetes
    }

    fn probe_names(&self) -> &'static [&'static str] {
        PROBES
    }

    async fn probe(&self, name: &str) -> CheckResult {
        match name {
            "node_ready" => self.check_node_ready().await,
            "node_pressure" => self.check_node_pressure().await,
            "pod_health" => self.check_pod_health().await,
            "cluster_operators" => self.check_cluster_operators().await,
            other => CheckResult::unknown(format!("no such probe: {}", other), other),
        }
    }
}

impl KubernetesExecutor {
    async fn check_node_ready(&self) -> CheckResult {
        let command = format!("get node {}", self.node);
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = match nodes.get(&self.node).await {
            Ok(node) => node,
            Err(e) => {
                return CheckResult::unknown(format!("could not read node object: {}", e), command)
            }
        };

        let (status, message) = classify_node_ready(&node);
        CheckResult::new(status, message, command)
            .with_detail("node", self.node.clone())
    }

    async fn check_node_pressure(&self) -> CheckResult {
        let command = format!("get node {}", self.node);
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = match nodes.get(&self.node).await {
            Ok(node) => node,
            Err(e) => {
                return CheckResult::unknown(format!("could not read node object: {}", e), command)
            }
        };

        let pressures = active_pressures(&node);
        if pressures.is_empty() {
            CheckResult::healthy("no resource pressure reported", command)
        } else {
            CheckResult::warning(
                format!("node under pressure: {}", pressures.join(", ")),
                command,
            )
            .with_detail("pressures", json!(pressures))
        }
    }

    async fn check_pod_health(&self) -> CheckResult {
        let command = format!("list pods on {}", self.node);
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", self.node));
        let list = match pods.list(&params).await {
            Ok(list) => list,
            Err(e) => return CheckResult::unknown(format!("could not list pods: {}", e), command),
        };

        let unhealthy = unhealthy_pods(&list.items);
        if unhealthy.is_empty() {
            return CheckResult::healthy(
                format!("{} pod(s) on node, none unhealthy", list.items.len()),
                command,
            )
            .with_detail("pod_count", list.items.len() as u64);
        }

        let shown: Vec<&str> = unhealthy.iter().take(10).map(String::as_str).collect();
        CheckResult::warning(
            format!("{} unhealthy pod(s) on node", unhealthy.len()),
            command,
        )
        .with_detail("pod_count", list.items.len() as u64)
        .with_detail("unhealthy_count", unhealthy.len() as u64)
        .with_detail("unhealthy_pods", json!(shown))
    }

    async fn check_cluster_operators(&self) -> CheckResult {
        let command = "list clusteroperators";
        if !self.is_openshift().await {
            // Expected absence on plain Kubernetes; never Critical.
            return CheckResult::unknown("not an OpenShift cluster", command)
                .with_detail("note", "config.openshift.io API group not present");
        }

        let gvk = GroupVersionKind::gvk("config.openshift.io", "v1", "ClusterOperator");
        let resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => {
                return CheckResult::unknown(
                    format!("could not list cluster operators: {}", e),
                    command,
                )
            }
        };

        let mut unavailable = Vec::new();
        let mut degraded = Vec::new();
        for operator in &list.items {
            let name = operator.metadata.name.clone().unwrap_or_default();
            match operator_state(operator) {
                OperatorState::Unavailable => unavailable.push(name),
                OperatorState::Degraded => degraded.push(name),
                OperatorState::Nominal => {}
            }
        }

        if !unavailable.is_empty() {
            return CheckResult::critical(
                format!("cluster operator(s) unavailable: {}", unavailable.join(", ")),
                command,
            )
            .with_detail("unavailable", json!(unavailable))
            .with_detail("degraded", json!(degraded));
        }
        if !degraded.is_empty() {
            return CheckResult::warning(
                format!("cluster operator(s) degraded: {}", degraded.join(", ")),
                command,
            )
            .with_detail("degraded", json!(degraded));
        }
        CheckResult::healthy(
            format!("{} cluster operator(s) nominal", list.items.len()),
            command,
        )
        .with_detail("operator_count", list.items.len() as u64)
    }
}

pub fn classify_node_ready(node: &Node) -> (CheckStatus, String) {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"));

    match ready.map(|c| c.status.as_str()) {
        Some("True") => (CheckStatus::Healthy, "node Ready".to_string()),
        Some("False") => {
            let reason = ready
                .and_then(|c| c.reason.clone())
                .unwrap_or_else(|| "unknown reason".to_string());
            (
                CheckStatus::Critical,
                format!("node NotReady: {}", reason),
            )
        }
        Some(_) => (
            CheckStatus::Unknown,
            "node Ready condition is Unknown (kubelet unreachable?)".to_string(),
        ),
        None => (
            CheckStatus::Unknown,
            "node has no Ready condition".to_string(),
        ),
    }
}

pub fn active_pressures(node: &Node) -> Vec<String> {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    conditions
        .iter()
        .filter(|c| {
            matches!(
                c.type_.as_str(),
                "MemoryPressure" | "DiskPressure" | "PIDPressure"
            ) && c.status == "True"
        })
        .map(|c| c.type_.clone())
        .collect()
}

/// Pods in CrashLoopBackOff or with excessive restarts, as `ns/name` keys.
pub fn unhealthy_pods(pods: &[Pod]) -> Vec<String> {
    let mut unhealthy = Vec::new();
    for pod in pods {
        let name = pod.metadata.name.as_deref().unwrap_or("unknown");
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
        let statuses = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let bad = statuses.iter().any(|cs| {
            let crash_looping = cs
                .state
                .as_ref()
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.reason.as_deref())
                == Some("CrashLoopBackOff");
            crash_looping || cs.restart_count > RESTART_WARN_THRESHOLD
        });
        if bad {
            unhealthy.push(format!("{}/{}", namespace, name));
        }
    }
    unhealthy
}

enum OperatorState {
    Nominal,
    Degraded,
    Unavailable,
}

fn operator_state(operator: &DynamicObject) -> OperatorState {
    let conditions = operator.data["status"]["conditions"]
        .as_array()
        .cloned()
        .unwrap_or_default();

    let condition = |type_: &str| -> Option<String> {
        conditions
            .iter()
            .find(|c| c["type"] == type_)
            .and_then(|c| c["status"].as_str())
            .map(str::to_string)
    };

    if condition("Available").as_deref() == Some("False") {
        OperatorState::Unavailable
    } else if condition("Degraded").as_deref() == Some("True") {
        OperatorState::Degraded
    } else {
        OperatorState::Nominal
    }
}
