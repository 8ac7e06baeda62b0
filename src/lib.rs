pub mod aggregate;
pub mod cli;
pub mod controller;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod server;

pub use error::{NodePulseError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
