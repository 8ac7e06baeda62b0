//! nodepulse-agent - per-node diagnostics agent
//!
//! The agent runs on each Kubernetes node (placed there by the controller's
//! DaemonSet) and:
//! - Finds NodeCheck requests targeting its node
//! - Runs the enabled probe categories through a bounded worker pool
//! - Prefers host-namespace command execution, falling back to the container
//! - Publishes one result bundle per request to the NodeCheck status

pub mod config;
pub mod evidence;
pub mod executor;
pub mod gather;
pub mod host;
pub mod publish;
