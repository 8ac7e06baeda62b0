pub mod client;
pub mod types;

pub use client::K8sClient;
pub use types::{NodeInfo, WorkloadInfo};
