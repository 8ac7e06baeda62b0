//! The NodeCheck custom resource: a declarative request to diagnose a node.

use crate::bundle::NodeCheckStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target value meaning "fan out to every node in the cluster".
pub const WILDCARD_NODE: &str = "*";

/// Label linking a derived per-node request back to its wildcard parent.
pub const PARENT_LABEL: &str = "nodepulse.io/parent";

/// Desired diagnostics for one node (or, with the wildcard target, for every
/// node). Wildcard requests exist only as fan-out templates: the controller
/// materializes one derived per-node request for each of them and agents only
/// ever observe concrete targets.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "nodepulse.io",
    version = "v1alpha1",
    kind = "NodeCheck",
    plural = "nodechecks",
    status = "NodeCheckStatus",
    shortname = "nc"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeCheckSpec {
    /// Target node name, or `"*"` for every node.
    pub node: String,

    /// Probe category toggles. All default to enabled.
    #[serde(default = "default_true")]
    pub system: bool,
    #[serde(default = "default_true")]
    pub hardware: bool,
    #[serde(default = "default_true")]
    pub disk: bool,
    #[serde(default = "default_true")]
    pub network: bool,
    #[serde(default = "default_true")]
    pub kubernetes: bool,

    /// Scheduling constraint contributed to agent placement. Wildcard
    /// requests never contribute selectors, only tolerations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Taints the agent workload must tolerate to reach the target node.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<CheckToleration>,
}

fn default_true() -> bool {
    true
}

impl NodeCheckSpec {
    /// Categories this request asks for, in canonical order.
    pub fn enabled_categories(&self) -> Vec<crate::bundle::CheckCategory> {
        use crate::bundle::CheckCategory;
        CheckCategory::all()
            .into_iter()
            .filter(|category| match category {
                CheckCategory::System => self.system,
                CheckCategory::Hardware => self.hardware,
                CheckCategory::Disk => self.disk,
                CheckCategory::Network => self.network,
                CheckCategory::Kubernetes => self.kubernetes,
            })
            .collect()
    }
}

impl Default for NodeCheckSpec {
    fn default() -> Self {
        Self {
            node: String::new(),
            system: true,
            hardware: true,
            disk: true,
            network: true,
            kubernetes: true,
            node_selector: BTreeMap::new(),
            tolerations: Vec::new(),
        }
    }
}

/// Toleration carried on a NodeCheck. Mirrors the core/v1 shape; kept as an
/// own type so the CRD schema derives cleanly. Identity for deduplication is
/// the (key, operator, effect) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckToleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

impl CheckToleration {
    /// Deduplication identity: taint key, operator, effect.
    pub fn identity(&self) -> (Option<&str>, Option<&str>, Option<&str>) {
        (
            self.key.as_deref(),
            self.operator.as_deref(),
            self.effect.as_deref(),
        )
    }
}

impl NodeCheck {
    /// Whether this request is a fan-out template rather than an observable
    /// target.
    pub fn is_wildcard(&self) -> bool {
        self.spec.node == WILDCARD_NODE
    }

    /// Concrete target node, if any.
    pub fn target_node(&self) -> Option<&str> {
        if self.is_wildcard() || self.spec.node.is_empty() {
            None
        } else {
            Some(&self.spec.node)
        }
    }

    /// Name of the wildcard parent, when this request was derived by fan-out.
    pub fn parent_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(PARENT_LABEL))
            .map(String::as_str)
    }
}

/// Object name for the derived per-node request of a wildcard parent.
/// Truncated to the 253-character object-name limit, keeping the node suffix.
pub fn derived_name(parent: &str, node: &str) -> String {
    const MAX: usize = 253;
    let full = format!("{}-{}", parent, node);
    if full.len() <= MAX {
        return full;
    }
    let keep = MAX.saturating_sub(node.len() + 1);
    format!("{}-{}", &parent[..keep], node)
}
