use crate::{NodePulseError, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::ListParams;
use kube::{Api, Client};
use nodepulse_common::NodeCheck;
use tracing::{debug, info};

use super::types::{NodeInfo, WorkloadInfo};

/// Read-side Kubernetes access for the query surface and CLI.
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn try_default() -> Result<Self> {
        debug!("Initializing Kubernetes client");

        let client = Client::try_default().await.map_err(|e| {
            NodePulseError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn checks(&self) -> Api<NodeCheck> {
        Api::all(self.client.clone())
    }

    pub async fn list_checks(&self) -> Result<Vec<NodeCheck>> {
        let list = self
            .checks()
            .list(&ListParams::default())
            .await
            .map_err(|e| NodePulseError::KubernetesError(format!("Failed to list NodeChecks: {}", e)))?;
        Ok(list.items)
    }

    pub async fn get_check(&self, name: &str) -> Result<NodeCheck> {
        self.checks().get(name).await.map_err(|e| {
            if matches!(&e, kube::Error::Api(api) if api.code == 404) {
                NodePulseError::CheckNotFound(name.to_string())
            } else {
                NodePulseError::KubernetesError(format!("Failed to get NodeCheck {}: {}", name, e))
            }
        })
    }

    pub async fn get_node_info(&self, name: &str) -> Result<NodeInfo> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let node = nodes.get(name).await.map_err(|e| {
            if matches!(&e, kube::Error::Api(api) if api.code == 404) {
                NodePulseError::NodeNotFound(name.to_string())
            } else {
                NodePulseError::KubernetesError(format!("Failed to get node {}: {}", name, e))
            }
        })?;
        Ok(NodeInfo::from_k8s_node(&node))
    }

    /// Workloads currently scheduled on one node.
    pub async fn list_node_workloads(&self, node: &str) -> Result<Vec<WorkloadInfo>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("spec.nodeName={}", node));
        let list = pods.list(&params).await.map_err(|e| {
            NodePulseError::KubernetesError(format!("Failed to list pods on {}: {}", node, e))
        })?;
        Ok(list.items.iter().map(WorkloadInfo::from_k8s_pod).collect())
    }
}
