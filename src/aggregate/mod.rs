//! Read-only aggregation over published NodeCheck results.
//!
//! Aggregation never mutates cluster state and tolerates partially populated
//! bundles: agents write status at their own pace, so any scan sees a mix of
//! fresh, stale, and absent results.

pub mod numeric;
pub mod rollup;

pub use numeric::{extract_signals, NodeSignals};
pub use rollup::{
    detail, fleet_summary, CheckDetail, CheckSummary, FleetSummary, ProbeBreakdown, StatusCounts,
};
