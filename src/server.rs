//! Read-only HTTP query surface for dashboards, plus the Prometheus
//! exposition endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::aggregate::{self, CheckDetail, CheckSummary, FleetSummary};
use crate::error::NodePulseError;
use crate::k8s::{K8sClient, NodeInfo, WorkloadInfo};
use crate::metrics::FleetMetrics;

#[derive(Clone)]
pub struct AppState {
    pub k8s: Arc<K8sClient>,
    pub metrics: Arc<FleetMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/checks", get(list_checks))
        .route("/api/checks/:name", get(get_check))
        .route("/api/fleet", get(fleet))
        .route("/api/nodes/:name", get(node_detail))
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn run(state: AppState, addr: &str) -> crate::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("query API listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

type ApiError = (StatusCode, String);

fn api_error(e: NodePulseError) -> ApiError {
    let code = match &e {
        NodePulseError::CheckNotFound(_) | NodePulseError::NodeNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Gauges are recomputed from a fresh scan on every scrape; staleness is
/// bounded by the scrape interval, not a background loop.
async fn metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    let checks = state.k8s.list_checks().await.map_err(api_error)?;
    state.metrics.update(&checks);
    state.metrics.render().map_err(api_error)
}

async fn list_checks(State(state): State<AppState>) -> Result<Json<Vec<CheckSummary>>, ApiError> {
    let checks = state.k8s.list_checks().await.map_err(api_error)?;
    Ok(Json(checks.iter().map(aggregate::rollup::summarize).collect()))
}

/// Full per-probe view with structured details, not the flattened wire form.
async fn get_check(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CheckDetail>, ApiError> {
    let check = state.k8s.get_check(&name).await.map_err(api_error)?;
    Ok(Json(aggregate::detail(&check)))
}

async fn fleet(State(state): State<AppState>) -> Result<Json<FleetSummary>, ApiError> {
    let checks = state.k8s.list_checks().await.map_err(api_error)?;
    Ok(Json(aggregate::fleet_summary(&checks)))
}

#[derive(Serialize)]
struct NodeDetail {
    info: NodeInfo,
    workloads: Vec<WorkloadInfo>,
}

async fn node_detail(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<NodeDetail>, ApiError> {
    let info = state.k8s.get_node_info(&name).await.map_err(api_error)?;
    let workloads = state
        .k8s
        .list_node_workloads(&name)
        .await
        .map_err(api_error)?;
    Ok(Json(NodeDetail { info, workloads }))
}
