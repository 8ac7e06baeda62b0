//! Level-triggered reconciliation of NodeCheck requests.
//!
//! One reconcile pass observes the whole world (all NodeChecks, all nodes,
//! the live agent DaemonSet) and converges it: wildcard templates fan out to
//! derived per-node requests, and the agent DaemonSet is created, updated in
//! place, or deleted to match the active request set. Re-running against an
//! unchanged world performs zero mutating calls.

pub mod fanout;
pub mod merge;
pub mod placement;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use nodepulse_common::NodeCheck;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::error::{NodePulseError, Result};
use fanout::{apply_fanout, list_node_names, plan_fanout};
use placement::{build_daemonset, decide, DesiredAgent, PlacementAction, AGENT_NAME};

const REQUEUE_INTERVAL: Duration = Duration::from_secs(300);
const ERROR_REQUEUE: Duration = Duration::from_secs(30);

pub struct Context {
    pub client: Client,
    /// Namespace the agent DaemonSet lives in.
    pub namespace: String,
    pub agent_image: String,
}

/// Run the controller until the watch stream ends.
pub async fn run_controller(client: Client, namespace: String, agent_image: String) -> Result<()> {
    info!(
        "Starting NodeCheck controller (agent namespace: {}, image: {})",
        namespace, agent_image
    );

    let context = Arc::new(Context {
        client: client.clone(),
        namespace,
        agent_image,
    });

    let checks: Api<NodeCheck> = Api::all(client);
    Controller::new(checks, Config::default().any_semantic())
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok(check) => info!("reconciled via {}", check.0.name),
                Err(e) => error!("reconciliation error: {}", e),
            }
        })
        .await;

    Ok(())
}

/// One level-triggered pass. The triggering object only tells us the world
/// changed; the pass itself always observes and converges the full world.
async fn reconcile(check: Arc<NodeCheck>, ctx: Arc<Context>) -> Result<Action> {
    info!("reconcile triggered by NodeCheck {}", check.name_any());

    let api: Api<NodeCheck> = Api::all(ctx.client.clone());
    let checks = api.list(&ListParams::default()).await?.items;
    let nodes = list_node_names(&ctx.client).await?;

    let plan = plan_fanout(&checks, &nodes);
    if !plan.is_empty() {
        apply_fanout(&ctx.client, &plan).await?;
    }

    // Active requests = concrete targets, both user-created and the derived
    // ones just planned (the fresh list may predate apply_fanout).
    let mut active: Vec<NodeCheck> = checks
        .iter()
        .filter(|c| !c.is_wildcard())
        .cloned()
        .collect();
    for created in &plan.create {
        if !active.iter().any(|c| c.metadata.name == created.metadata.name) {
            active.push(created.clone());
        }
    }
    // Wildcard templates still contribute tolerations to placement.
    let mut placement_inputs = active.clone();
    placement_inputs.extend(checks.iter().filter(|c| c.is_wildcard()).cloned());

    converge_agent(&ctx, active.len(), &placement_inputs).await?;

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

async fn converge_agent(ctx: &Context, active_requests: usize, checks: &[NodeCheck]) -> Result<()> {
    let desired = DesiredAgent::from_requests(checks, &ctx.agent_image);
    let api: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    let live = api.get_opt(AGENT_NAME).await?;

    match decide(active_requests, live.as_ref(), &desired) {
        PlacementAction::Create => {
            let ds = build_daemonset(&desired, &ctx.namespace);
            api.create(&PostParams::default(), &ds).await?;
            info!("created agent DaemonSet for {} active request(s)", active_requests);
        }
        PlacementAction::Update => {
            let ds = build_daemonset(&desired, &ctx.namespace);
            api.patch(AGENT_NAME, &PatchParams::default(), &Patch::Merge(&ds))
                .await?;
            info!("updated agent DaemonSet in place");
        }
        PlacementAction::Delete => {
            api.delete(AGENT_NAME, &DeleteParams::default()).await?;
            info!("deleted agent DaemonSet: no active requests remain");
        }
        PlacementAction::Nothing => {}
    }
    Ok(())
}

fn error_policy(check: Arc<NodeCheck>, error: &NodePulseError, _ctx: Arc<Context>) -> Action {
    error!(
        "reconcile of NodeCheck {} failed, retrying in {:?}: {}",
        check.name_any(),
        ERROR_REQUEUE,
        error
    );
    Action::requeue(ERROR_REQUEUE)
}
