//! REST API handlers for candidate selection, event recording, rotation
//! administration and operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rotation_core::RotationError;
use rotation_engine::RotationEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Maximum identifier length accepted at the API boundary.
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RotationEngine>,
    pub node_id: String,
    pub start_time: Instant,
}

fn validate_id(name: &'static str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("'{name}' must not be empty"));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(format!("'{name}' exceeds maximum length"));
    }
    Ok(())
}

fn bad_request(message: String) -> (StatusCode, Json<ErrorResponse>) {
    metrics::counter!("api.validation_errors").increment(1);
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "invalid_request".to_string(),
            message,
        }),
    )
}

fn engine_error(e: RotationError) -> (StatusCode, Json<ErrorResponse>) {
    metrics::counter!("api.errors").increment(1);
    match e {
        RotationError::NoCandidatesInContext(context_id) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no_candidates".to_string(),
                message: format!("no candidates registered in context '{context_id}'"),
            }),
        ),
        other => {
            error!(error = %other, "Rotation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "rotation_failed".to_string(),
                    message: "Internal processing error".to_string(),
                }),
            )
        }
    }
}

/// POST /v1/contexts/{context_id}/selection — pick the next candidate to
/// show in this context and record its exposure.
#[utoipa::path(
    post,
    path = "/v1/contexts/{context_id}/selection",
    tag = "Rotation",
    params(("context_id" = String, Path, description = "Placement/slot identifier")),
    responses(
        (status = 200, description = "Candidate selected", body = SelectionResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 404, description = "Context has no candidates", body = ErrorResponse),
        (status = 500, description = "Ledger failure", body = ErrorResponse),
    ),
)]
pub async fn handle_selection(
    State(state): State<AppState>,
    Path(context_id): Path<String>,
) -> Result<Json<SelectionResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(msg) = validate_id("context_id", &context_id) {
        warn!(context_id = %context_id, error = %msg, "Selection request validation failed");
        return Err(bad_request(msg));
    }

    let decision = state
        .engine
        .select_candidate(&context_id)
        .await
        .map_err(engine_error)?;

    Ok(Json(SelectionResponse {
        candidate_id: decision.candidate_id().to_string(),
        strategy: if decision.is_explore() {
            "explore".to_string()
        } else {
            "exploit".to_string()
        },
    }))
}

/// POST /v1/contexts/{context_id}/candidates/{candidate_id}/engagements —
/// record a user engagement (e.g. a click) on a previously shown candidate.
#[utoipa::path(
    post,
    path = "/v1/contexts/{context_id}/candidates/{candidate_id}/engagements",
    tag = "Rotation",
    params(
        ("context_id" = String, Path, description = "Placement/slot identifier"),
        ("candidate_id" = String, Path, description = "Content item identifier"),
    ),
    responses(
        (status = 200, description = "Engagement recorded", body = StatusResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 500, description = "Ledger failure", body = ErrorResponse),
    ),
)]
pub async fn handle_engagement(
    State(state): State<AppState>,
    Path((context_id, candidate_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    validate_pair(&context_id, &candidate_id)?;

    state
        .engine
        .record_engagement(&context_id, &candidate_id)
        .await
        .map_err(engine_error)?;

    Ok(Json(StatusResponse {
        status: "recorded".to_string(),
    }))
}

/// POST /v1/contexts/{context_id}/candidates/{candidate_id}/exposures —
/// record an exposure that happened outside the selection path.
#[utoipa::path(
    post,
    path = "/v1/contexts/{context_id}/candidates/{candidate_id}/exposures",
    tag = "Rotation",
    params(
        ("context_id" = String, Path, description = "Placement/slot identifier"),
        ("candidate_id" = String, Path, description = "Content item identifier"),
    ),
    responses(
        (status = 200, description = "Exposure recorded", body = StatusResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 500, description = "Ledger failure", body = ErrorResponse),
    ),
)]
pub async fn handle_exposure(
    State(state): State<AppState>,
    Path((context_id, candidate_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    validate_pair(&context_id, &candidate_id)?;

    state
        .engine
        .record_exposure(&context_id, &candidate_id)
        .await
        .map_err(engine_error)?;

    Ok(Json(StatusResponse {
        status: "recorded".to_string(),
    }))
}

/// PUT /v1/contexts/{context_id}/candidates/{candidate_id} — add a
/// candidate to the context's rotation set.
#[utoipa::path(
    put,
    path = "/v1/contexts/{context_id}/candidates/{candidate_id}",
    tag = "Rotation",
    params(
        ("context_id" = String, Path, description = "Placement/slot identifier"),
        ("candidate_id" = String, Path, description = "Content item identifier"),
    ),
    responses(
        (status = 200, description = "Candidate added to rotation", body = StatusResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 500, description = "Ledger failure", body = ErrorResponse),
    ),
)]
pub async fn handle_add_candidate(
    State(state): State<AppState>,
    Path((context_id, candidate_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    validate_pair(&context_id, &candidate_id)?;

    state
        .engine
        .add_candidate(&context_id, &candidate_id)
        .await
        .map_err(engine_error)?;

    Ok(Json(StatusResponse {
        status: "added".to_string(),
    }))
}

/// DELETE /v1/contexts/{context_id}/candidates/{candidate_id} — remove a
/// candidate from the context's rotation set.
#[utoipa::path(
    delete,
    path = "/v1/contexts/{context_id}/candidates/{candidate_id}",
    tag = "Rotation",
    params(
        ("context_id" = String, Path, description = "Placement/slot identifier"),
        ("candidate_id" = String, Path, description = "Content item identifier"),
    ),
    responses(
        (status = 200, description = "Candidate removed from rotation", body = StatusResponse),
        (status = 400, description = "Invalid identifier", body = ErrorResponse),
        (status = 404, description = "Candidate was not in rotation", body = ErrorResponse),
        (status = 500, description = "Ledger failure", body = ErrorResponse),
    ),
)]
pub async fn handle_remove_candidate(
    State(state): State<AppState>,
    Path((context_id, candidate_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    validate_pair(&context_id, &candidate_id)?;

    let removed = state
        .engine
        .remove_candidate(&context_id, &candidate_id)
        .await
        .map_err(engine_error)?;

    if !removed {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "not_in_rotation".to_string(),
                message: format!("'{candidate_id}' is not in rotation for '{context_id}'"),
            }),
        ));
    }

    Ok(Json(StatusResponse {
        status: "removed".to_string(),
    }))
}

fn validate_pair(
    context_id: &str,
    candidate_id: &str,
) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if let Err(msg) = validate_id("context_id", context_id) {
        return Err(bad_request(msg));
    }
    if let Err(msg) = validate_id("candidate_id", candidate_id) {
        return Err(bad_request(msg));
    }
    Ok(())
}

/// GET /health — Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Operations",
    responses((status = 200, description = "Service health", body = HealthResponse)),
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Operations",
    responses((status = 200, description = "Ready to accept traffic")),
)]
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe for Kubernetes.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Operations",
    responses((status = 200, description = "Process is live")),
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize, ToSchema)]
pub struct SelectionResponse {
    pub candidate_id: String,
    /// "explore" when the candidate was force-explored, "exploit" when
    /// it won the score ranking.
    pub strategy: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}
