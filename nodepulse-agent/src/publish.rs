//! Finding this node's NodeCheck requests and publishing results to their
//! status subresources.

use anyhow::{Context, Result};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use nodepulse_common::{NodeCheck, NodeCheckStatus};
use serde_json::json;

/// NodeCheck requests targeting the given node. Wildcard templates are
/// excluded; the controller materializes derived per-node requests for them,
/// and those derived objects are what we match here.
pub async fn requests_for_node(client: &Client, node: &str) -> Result<Vec<NodeCheck>> {
    let api: Api<NodeCheck> = Api::all(client.clone());
    let list = api
        .list(&ListParams::default())
        .await
        .context("listing NodeCheck objects")?;

    Ok(list
        .items
        .into_iter()
        .filter(|check| check.target_node() == Some(node))
        .collect())
}

/// Merge-patch the status subresource of one NodeCheck. The agent is the only
/// status writer, so a merge patch cannot clobber anyone else's fields.
pub async fn publish_status(client: &Client, name: &str, status: &NodeCheckStatus) -> Result<()> {
    let api: Api<NodeCheck> = Api::all(client.clone());
    api.patch_status(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await
    .with_context(|| format!("patching status of NodeCheck {}", name))?;
    Ok(())
}
