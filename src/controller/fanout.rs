//! Wildcard fan-out: materializing one derived per-node NodeCheck for each
//! wildcard template, and garbage-collecting derived objects whose parent or
//! node has gone away.
//!
//! Derived requests copy the template's probe toggles and tolerations but
//! never its node selector: a wildcard's role is cluster-wide fan-out, not
//! host placement. Derived objects carry the parent label so they can be
//! traced back and collected.

use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::core::ObjectMeta;
use kube::Client;
use nodepulse_common::{derived_name, NodeCheck, NodeCheckSpec, PARENT_LABEL};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::error::{NodePulseError, Result};

/// Mutations one fan-out pass should perform. Computed as a pure function of
/// the observed world so reconciliation stays idempotent and testable.
#[derive(Debug, Default)]
pub struct FanoutPlan {
    pub create: Vec<NodeCheck>,
    pub delete: Vec<String>,
}

impl FanoutPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Plan the derived-object set: for every (wildcard parent, node) pair one
/// derived NodeCheck must exist with the spec its template currently
/// prescribes; a missing or drifted derived object is (re)applied, and any
/// derived object outside the product is collected.
pub fn plan_fanout(checks: &[NodeCheck], nodes: &[String]) -> FanoutPlan {
    let parents: BTreeMap<&str, &NodeCheck> = checks
        .iter()
        .filter(|c| c.is_wildcard())
        .filter_map(|c| c.metadata.name.as_deref().map(|name| (name, c)))
        .collect();

    let existing: BTreeMap<&str, &NodeCheck> = checks
        .iter()
        .filter(|c| c.parent_name().is_some())
        .filter_map(|c| c.metadata.name.as_deref().map(|name| (name, c)))
        .collect();

    let mut wanted: BTreeSet<String> = BTreeSet::new();
    let mut create = Vec::new();
    for (parent_name, parent) in &parents {
        for node in nodes {
            let name = derived_name(parent_name, node);
            wanted.insert(name.clone());
            let fresh = derive(parent, parent_name, node, &name);
            match existing.get(name.as_str()) {
                Some(current) if current.spec == fresh.spec => {}
                // missing, or the template changed since materialization
                _ => create.push(fresh),
            }
        }
    }

    let delete = existing
        .keys()
        .filter(|name| !wanted.contains(**name))
        .map(|name| name.to_string())
        .collect();

    FanoutPlan { create, delete }
}

fn derive(parent: &NodeCheck, parent_name: &str, node: &str, name: &str) -> NodeCheck {
    let mut check = NodeCheck::new(
        name,
        NodeCheckSpec {
            node: node.to_string(),
            system: parent.spec.system,
            hardware: parent.spec.hardware,
            disk: parent.spec.disk,
            network: parent.spec.network,
            kubernetes: parent.spec.kubernetes,
            node_selector: BTreeMap::new(),
            tolerations: parent.spec.tolerations.clone(),
        },
    );
    check.metadata = ObjectMeta {
        name: Some(name.to_string()),
        labels: Some([(PARENT_LABEL.to_string(), parent_name.to_string())].into()),
        ..ObjectMeta::default()
    };
    check
}

/// Apply one fan-out plan against the cluster.
pub async fn apply_fanout(client: &Client, plan: &FanoutPlan) -> Result<()> {
    let api: Api<NodeCheck> = Api::all(client.clone());

    for check in &plan.create {
        let name = check
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| NodePulseError::ReconcileError("derived check without name".into()))?;
        api.patch(
            name,
            &PatchParams::apply("nodepulse-controller"),
            &Patch::Apply(check),
        )
        .await?;
        info!("materialized derived NodeCheck {}", name);
    }

    for name in &plan.delete {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("collected stale derived NodeCheck {}", name),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Current node names, for the fan-out product.
pub async fn list_node_names(client: &Client) -> Result<Vec<String>> {
    let api: Api<k8s_openapi::api::core::v1::Node> = Api::all(client.clone());
    let list = api.list(&ListParams::default()).await?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|node| node.metadata.name)
        .collect())
}
