use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Descriptive node view for the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub kernel_version: String,
    pub os_image: String,
    pub container_runtime: String,
    pub kubelet_version: String,
    pub ready: bool,
    pub addresses: BTreeMap<String, String>,
}

impl NodeInfo {
    pub fn from_k8s_node(node: &Node) -> Self {
        let status = node.status.as_ref();
        let info = status.and_then(|s| s.node_info.as_ref());

        let ready = status
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
            .map(|c| c.status == "True")
            .unwrap_or(false);

        let addresses = status
            .and_then(|s| s.addresses.as_ref())
            .map(|addresses| {
                addresses
                    .iter()
                    .map(|a| (a.type_.clone(), a.address.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            labels: node.metadata.labels.clone().unwrap_or_default(),
            kernel_version: info.map(|i| i.kernel_version.clone()).unwrap_or_default(),
            os_image: info.map(|i| i.os_image.clone()).unwrap_or_default(),
            container_runtime: info
                .map(|i| i.container_runtime_version.clone())
                .unwrap_or_default(),
            kubelet_version: info.map(|i| i.kubelet_version.clone()).unwrap_or_default(),
            ready,
            addresses,
        }
    }
}

/// One workload scheduled on a node, for the node detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub restarts: i32,
}

impl WorkloadInfo {
    pub fn from_k8s_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        let restarts = status
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| statuses.iter().map(|cs| cs.restart_count).sum())
            .unwrap_or(0);

        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            phase: status
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            restarts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeCondition, NodeStatus, NodeSystemInfo};

    #[test]
    fn node_info_reads_system_info_and_readiness() {
        let node = Node {
            metadata: kube::core::ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            status: Some(NodeStatus {
                node_info: Some(NodeSystemInfo {
                    kernel_version: "6.8.0".to_string(),
                    kubelet_version: "v1.29.2".to_string(),
                    ..Default::default()
                }),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let info = NodeInfo::from_k8s_node(&node);
        assert_eq!(info.name, "worker-1");
        assert_eq!(info.kernel_version, "6.8.0");
        assert!(info.ready);
    }
}
