use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use shipyard_common::{BuildComplete, RunRecord};
use tracing::{info, warn};
use uuid::Uuid;

use crate::campaign::{CampaignController, RunStore, criteria_from_value};
use crate::errors::CampaignError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub controller: Arc<CampaignController>,
    pub store: Arc<dyn RunStore>,
    pub default_max_iterations: u32,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct StartCampaignRequest {
    pub criteria: Value,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// A collaborator (model, builder, evaluator) failed.
    Upstream(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<CampaignError> for ApiError {
    fn from(err: CampaignError) -> Self {
        match err {
            CampaignError::InvalidCriteria(_) => ApiError::BadRequest(err.to_string()),
            CampaignError::Ideation(_)
            | CampaignError::NoIdeas
            | CampaignError::SpecWriting(_)
            | CampaignError::Critique(_)
            | CampaignError::Build(_)
            | CampaignError::Qa(_) => ApiError::Upstream(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/api/campaigns", get(list_campaigns).post(start_campaign))
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/webhooks/builds/complete", post(build_complete))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn service_info(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "shipyard",
        "completion": state.controller.completion_mode(),
    }))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn start_campaign(
    State(state): State<SharedState>,
    Json(req): Json<StartCampaignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let criteria = criteria_from_value(req.criteria, state.default_max_iterations)
        .map_err(|e| ApiError::BadRequest(format!("invalid criteria: {}", e)))?;
    let run_id = state.controller.start_campaign(criteria).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "started", "run_id": run_id})),
    ))
}

async fn get_campaign(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, ApiError> {
    if let Some(run) = state.controller.registry().get(&id) {
        return Ok(Json(run));
    }
    // Runs from earlier processes only exist in the store.
    let stored = state
        .store
        .get_run(id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match stored {
        Some(run) => Ok(Json(run)),
        None => Err(ApiError::NotFound(format!("Campaign run {} not found", id))),
    }
}

async fn list_campaigns(State(state): State<SharedState>) -> Result<Json<Vec<RunRecord>>, ApiError> {
    let mut runs = state.controller.registry().list();
    let live: HashSet<Uuid> = runs.iter().map(|r| r.id).collect();
    let stored = state
        .store
        .list_runs()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    runs.extend(stored.into_iter().filter(|r| !live.contains(&r.id)));
    runs.sort_by_key(|r| r.created_at);
    Ok(Json(runs))
}

/// Builder callback. Always acknowledges; malformed payloads and unknown
/// runs are logged and dropped.
async fn build_complete(State(state): State<SharedState>, Json(payload): Json<Value>) -> Json<Value> {
    match serde_json::from_value::<BuildComplete>(payload) {
        Ok(event) => {
            info!(run_id = %event.run_id, "build-complete callback received");
            let controller = state.controller.clone();
            tokio::spawn(async move {
                controller.on_build_complete(event).await;
            });
        }
        Err(e) => warn!(error = %e, "ignoring malformed build-complete payload"),
    }
    Json(json!({"ok": true}))
}

// ── Tests ─────────────────────────────────────────────────────────────
