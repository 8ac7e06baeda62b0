//! nodepulse-agent - per-node diagnostics agent
//!
//! Runs on each node via the controller-managed DaemonSet. Every interval it
//! lists the NodeCheck requests targeting its node, runs the enabled probe
//! categories, and publishes one result bundle per request.

use anyhow::{Context, Result};
use kube::Client;
use log::{debug, info, warn};
use nodepulse_agent::config::AgentConfig;
use nodepulse_agent::executor::disk::DiskExecutor;
use nodepulse_agent::executor::hardware::HardwareExecutor;
use nodepulse_agent::executor::kubernetes::KubernetesExecutor;
use nodepulse_agent::executor::network::NetworkExecutor;
use nodepulse_agent::executor::system::SystemExecutor;
use nodepulse_agent::executor::{CheckRunner, Executor};
use nodepulse_agent::gather::Gatherer;
use nodepulse_agent::host::HostCommandRunner;
use nodepulse_agent::publish;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AgentConfig::from_env()?;
    info!(
        "nodepulse-agent starting on node {} (interval {:?}, {} workers)",
        config.node_name, config.interval, config.workers
    );

    let client = Client::try_default()
        .await
        .context("connecting to the Kubernetes API")?;

    // Loss of host-namespace access degrades probes to the container view
    // rather than keeping the node unobserved.
    let host = match HostCommandRunner::new(&config.host_root) {
        Ok(runner) => Some(runner),
        Err(e) => {
            warn!(
                "host namespace unavailable, probes fall back to container view: {:#}",
                e
            );
            None
        }
    };

    let gatherer = Arc::new(Gatherer::new(host, config.probe_timeout));
    let executors: Vec<Arc<dyn Executor>> = vec![
        Arc::new(SystemExecutor::new(gatherer.clone())),
        Arc::new(HardwareExecutor::new(gatherer.clone())),
        Arc::new(DiskExecutor::new(gatherer.clone())),
        Arc::new(NetworkExecutor::new(gatherer.clone())),
        Arc::new(KubernetesExecutor::new(
            client.clone(),
            config.node_name.clone(),
        )),
    ];
    let runner = CheckRunner::new(executors, config.workers, config.probe_timeout);

    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!("nodepulse-agent running. Press Ctrl+C to exit.");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_cycle(&client, &config.node_name, &runner).await {
                    warn!("check cycle failed: {:#}", e);
                }
            }
        }
    }

    info!("nodepulse-agent stopped");
    Ok(())
}

/// One cycle: find this node's requests, run each, publish each. A publish
/// failure for one request does not stop the others.
async fn run_cycle(client: &Client, node: &str, runner: &CheckRunner) -> Result<()> {
    let requests = publish::requests_for_node(client, node).await?;
    if requests.is_empty() {
        debug!("no NodeCheck requests target {}", node);
        return Ok(());
    }

    for check in requests {
        let Some(name) = check.metadata.name.clone() else {
            continue;
        };
        let enabled = check.spec.enabled_categories();
        let bundle = runner.run_cycle(&enabled).await;
        let status = bundle.to_status(node);

        match publish::publish_status(client, &name, &status).await {
            Ok(()) => info!(
                "published {} result(s) for NodeCheck {} (overall: {})",
                bundle.len(),
                name,
                bundle.overall()
            ),
            Err(e) => warn!("could not publish NodeCheck {}: {:#}", name, e),
        }
    }
    Ok(())
}
