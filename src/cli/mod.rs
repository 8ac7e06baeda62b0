pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nodepulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-node health diagnostics and agent placement for Kubernetes", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the placement controller and query API")]
    Controller {
        #[arg(long, default_value = "nodepulse", help = "Namespace for the agent DaemonSet")]
        namespace: String,

        #[arg(
            long,
            default_value = crate::controller::placement::DEFAULT_AGENT_IMAGE,
            help = "Agent container image"
        )]
        agent_image: String,

        #[arg(long, default_value = "0.0.0.0:8080", help = "Query API listen address")]
        listen: String,
    },
    #[command(about = "Show fleet-wide health summary")]
    Status,
    #[command(about = "Show one NodeCheck's full per-probe detail")]
    Get {
        #[arg(help = "NodeCheck name")]
        name: String,

        #[arg(short, long, help = "Emit raw JSON instead of a table")]
        json: bool,
    },
    #[command(about = "Show a node's info and scheduled workloads")]
    Node {
        #[arg(help = "Node name")]
        name: String,
    },
}
