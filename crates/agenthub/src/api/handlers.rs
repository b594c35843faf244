//! HTTP request handlers.
//!
//! Agent endpoints take the raw JSON body and the caller's tracking id, hand
//! both to the dispatcher, and return whatever payload it produced as-is.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::observability::{self, CPU_SAMPLE_INTERVAL, HostSpecs};

use super::error::ApiResult;
use super::state::AppState;

/// A JSON document that is already serialized.
#[derive(Debug)]
pub struct JsonText(pub String);

impl IntoResponse for JsonText {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/json")], self.0).into_response()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub agents: usize,
    pub pending_requests: usize,
    pub running_scripts: usize,
    pub uptime_secs: i64,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        agents: state.hub.len(),
        pending_requests: state.pending.len(),
        running_scripts: state.scripts.jobs().len(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}

/// List connected agent ids.
#[instrument(skip(state, body))]
pub async fn ws_agents(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: String,
) -> ApiResult<JsonText> {
    let payload = state.dispatcher.agents_request(&body, &tracking_id).await?;
    Ok(JsonText(payload))
}

/// Start the federated client on an agent.
#[instrument(skip(state, body))]
pub async fn ws_run(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: String,
) -> ApiResult<JsonText> {
    let payload = state.dispatcher.run_request(&body, &tracking_id).await?;
    Ok(JsonText(payload))
}

/// Dataset statistics of an agent.
#[instrument(skip(state, body))]
pub async fn ws_stats(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: String,
) -> ApiResult<JsonText> {
    let payload = state.dispatcher.stats_request(&body, &tracking_id).await?;
    Ok(JsonText(payload))
}

/// Log tail of an agent.
#[instrument(skip(state, body))]
pub async fn ws_logs(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: String,
) -> ApiResult<JsonText> {
    let payload = state.dispatcher.logs_request(&body, &tracking_id).await?;
    Ok(JsonText(payload))
}

/// Identifier-existence check on an agent.
#[instrument(skip(state, body))]
pub async fn ws_check_ids(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
    body: String,
) -> ApiResult<JsonText> {
    let payload = state
        .dispatcher
        .check_ids_request(&body, &tracking_id)
        .await?;
    Ok(JsonText(payload))
}

/// CPU and memory snapshot of the host running the hub.
#[instrument]
pub async fn machine_specs(Path(tracking_id): Path<String>) -> ApiResult<Json<HostSpecs>> {
    let specs = observability::read_host_specs(CPU_SAMPLE_INTERVAL).await?;
    Ok(Json(specs))
}

/// Progress of the script job running under `tracking_id`.
pub async fn progress(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> JsonText {
    JsonText(state.scripts.progress(&tracking_id))
}

/// Run a configured script program under the caller's tracking id.
#[instrument(skip(state, body))]
pub async fn run_script(
    state: AppState,
    program: Arc<str>,
    tracking_id: String,
    body: String,
) -> ApiResult<JsonText> {
    info!("Running script for {}", tracking_id);
    let response = state
        .scripts
        .execute(&program, &body, &tracking_id)
        .await?;
    Ok(JsonText(response))
}
