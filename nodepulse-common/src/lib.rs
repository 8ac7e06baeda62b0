//! Shared data model for nodepulse
//!
//! This crate defines what agents, the controller, and the aggregation layer
//! exchange:
//! - [`CheckStatus`] and the worst-status rollup ordering
//! - [`CheckResult`] and the flatten/reconstruct convention for details
//! - the `NodeCheck` custom resource (check request + published bundle)
//! - parse helpers for CLI output (unit suffixes, percentages, columns)

pub mod bundle;
pub mod details;
pub mod parse;
pub mod request;
pub mod result;
pub mod status;

pub use bundle::{CheckCategory, FlatCheckResult, NodeCheckStatus, ResultBundle};
pub use details::{flatten_details, reconstruct_details};
pub use request::{derived_name, CheckToleration, NodeCheck, NodeCheckSpec, PARENT_LABEL, WILDCARD_NODE};
pub use result::{CheckResult, Details};
pub use status::CheckStatus;
