use crate::aggregate::{self, fleet_summary};
use crate::cli::Commands;
use crate::controller;
use crate::k8s::K8sClient;
use crate::metrics::FleetMetrics;
use crate::server::{self, AppState};
use crate::Result;
use nodepulse_common::CheckStatus;
use std::sync::Arc;
use tracing::info;

pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Controller {
            namespace,
            agent_image,
            listen,
        } => handle_controller(namespace, agent_image, listen).await,
        Commands::Status => handle_status().await,
        Commands::Get { name, json } => handle_get(name, json).await,
        Commands::Node { name } => handle_node(name).await,
    }
}

/// Controller and query API share one process; either exiting ends it.
async fn handle_controller(namespace: String, agent_image: String, listen: String) -> Result<()> {
    let k8s = Arc::new(K8sClient::try_default().await?);
    let state = AppState {
        k8s: k8s.clone(),
        metrics: Arc::new(FleetMetrics::new()?),
    };

    let client = k8s.client();
    tokio::select! {
        result = controller::run_controller(client, namespace, agent_image) => result,
        result = server::run(state, &listen) => result,
    }
}

async fn handle_status() -> Result<()> {
    let k8s = K8sClient::try_default().await?;
    let checks = k8s.list_checks().await?;
    let fleet = fleet_summary(&checks);

    println!("Fleet: {}", fleet.overall);
    println!(
        "Requests: {} healthy, {} warning, {} critical, {} unknown",
        fleet.requests.healthy, fleet.requests.warning, fleet.requests.critical, fleet.requests.unknown
    );

    if !fleet.probes.is_empty() {
        println!("\n{:<12} {:<20} {:<10} H/W/C/U", "CATEGORY", "PROBE", "WORST");
        for probe in &fleet.probes {
            println!(
                "{:<12} {:<20} {:<10} {}/{}/{}/{}",
                probe.category,
                probe.probe,
                probe.worst,
                probe.counts.healthy,
                probe.counts.warning,
                probe.counts.critical,
                probe.counts.unknown
            );
        }
    }

    println!("\n{:<40} {:<25} {:<10} {:<8}", "NAME", "NODE", "STATUS", "PROBES");
    for check in &checks {
        let summary = aggregate::rollup::summarize(check);
        println!(
            "{:<40} {:<25} {:<10} {:<8}",
            summary.name, summary.node, summary.overall, summary.probes
        );
    }
    Ok(())
}

async fn handle_get(name: String, json: bool) -> Result<()> {
    let k8s = K8sClient::try_default().await?;
    let check = k8s.get_check(&name).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&aggregate::detail(&check))?
        );
        return Ok(());
    }

    let summary = aggregate::rollup::summarize(&check);
    println!("NodeCheck: {} (node: {})", summary.name, summary.node);
    println!("Overall:   {}", summary.overall);
    if let Some(last_run) = &summary.last_run {
        println!("Last run:  {}", last_run);
    }
    if let Some(agent) = &summary.agent {
        println!("Agent:     {}", agent);
    }

    let Some(status) = &check.status else {
        println!("\nNo results published yet.");
        return Ok(());
    };

    println!("\n{:<12} {:<20} {:<10} MESSAGE", "CATEGORY", "PROBE", "STATUS");
    for (category, probe, result) in status.iter_results() {
        println!(
            "{:<12} {:<20} {:<10} {}",
            category.as_str(),
            probe,
            result.status,
            result.message
        );
        if result.status != CheckStatus::Healthy && !result.command.is_empty() {
            println!("{:<44} reproduce: {}", "", result.command);
        }
    }
    Ok(())
}

async fn handle_node(name: String) -> Result<()> {
    let k8s = K8sClient::try_default().await?;
    let info = k8s.get_node_info(&name).await?;
    let workloads = k8s.list_node_workloads(&name).await?;
    info!("node {} runs {} workload(s)", name, workloads.len());

    println!("Node:      {}", info.name);
    println!("Ready:     {}", info.ready);
    println!("Kernel:    {}", info.kernel_version);
    println!("OS:        {}", info.os_image);
    println!("Runtime:   {}", info.container_runtime);
    println!("Kubelet:   {}", info.kubelet_version);
    for (kind, address) in &info.addresses {
        println!("Address:   {} ({})", address, kind);
    }

    println!("\n{:<50} {:<20} {:<12} {:<8}", "WORKLOAD", "NAMESPACE", "PHASE", "RESTARTS");
    for w in &workloads {
        println!(
            "{:<50} {:<20} {:<12} {:<8}",
            w.name, w.namespace, w.phase, w.restarts
        );
    }
    Ok(())
}
