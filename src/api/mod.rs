//! HTTP façade.
//!
//! Team creation and statistics call the engine directly. Every other route
//! becomes a dispatcher job and waits for its result up to the configured
//! request timeout; a request that is abandoned or times out cancels its job.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::dispatcher::{Dispatcher, Job, JobKind, JobOutput, TeamRef, UserRef};
use crate::engine::ReviewEngine;
use crate::error::{ReviewError, Result};
use crate::model::Team;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ReviewEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub request_timeout: Duration,
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let status = match &self {
            ReviewError::NotFound(_) => StatusCode::NOT_FOUND,
            ReviewError::AlreadyExists(_)
            | ReviewError::MergeFrozen(_)
            | ReviewError::NotAssigned { .. }
            | ReviewError::UserInactive(_)
            | ReviewError::NoCandidate(_) => StatusCode::CONFLICT,
            ReviewError::InvalidInput(_) | ReviewError::UnknownOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            ReviewError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            ReviewError::Canceled => StatusCode::GATEWAY_TIMEOUT,
            ReviewError::Storage { .. } => {
                tracing::error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/team/add", post(add_team_handler))
        .route("/team/get", get(get_team_handler))
        .route("/team/deactivate", post(deactivate_team_handler))
        .route("/users/setIsActive", post(set_user_active_handler))
        .route("/users/getReview", get(get_reviews_handler))
        .route("/pullRequest/create", post(create_pr_handler))
        .route("/pullRequest/merge", post(merge_pr_handler))
        .route("/pullRequest/reassign", post(reassign_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    tracing::info!(addr = ?addr, "Starting HTTP API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// Submit a job and wait for its result.
async fn run_job(state: &ApiState, kind: JobKind, params: Value) -> Result<JobOutput> {
    let (job, handle) = Job::new(kind, params);
    // Cancels the job if this request is dropped or times out.
    let _guard = handle.token().drop_guard();

    state.dispatcher.submit(job);
    match tokio::time::timeout(state.request_timeout, handle.wait()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(kind = %kind, timeout_ms = state.request_timeout.as_millis() as u64, "Request timed out");
            Err(ReviewError::Canceled)
        }
    }
}

fn body(payload: std::result::Result<Json<Value>, JsonRejection>) -> Result<Value> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ReviewError::InvalidInput(e.body_text()))
}

async fn add_team_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Team>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(team) = payload.map_err(|e| ReviewError::InvalidInput(e.body_text()))?;
    let team = state.engine.add_team(team).await?;
    Ok((StatusCode::CREATED, Json(json!({ "team": team }))))
}

async fn get_team_handler(
    State(state): State<ApiState>,
    query: std::result::Result<Query<TeamRef>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(team_ref) = query.map_err(|e| ReviewError::InvalidInput(e.body_text()))?;
    let output = run_job(&state, JobKind::GetTeam, json!(team_ref)).await?;
    Ok(Json(output))
}

async fn deactivate_team_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let output = run_job(&state, JobKind::DeactivateTeam, body(payload)?).await?;
    Ok(Json(output))
}

async fn set_user_active_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let output = run_job(&state, JobKind::SetUserActive, body(payload)?).await?;
    Ok(Json(json!({ "user": output })))
}

async fn get_reviews_handler(
    State(state): State<ApiState>,
    query: std::result::Result<Query<UserRef>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(user_ref) = query.map_err(|e| ReviewError::InvalidInput(e.body_text()))?;
    let output = run_job(&state, JobKind::GetReviews, json!(user_ref)).await?;
    Ok(Json(output))
}

async fn create_pr_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let output = run_job(&state, JobKind::CreatePullRequest, body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "pr": output }))))
}

async fn merge_pr_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let output = run_job(&state, JobKind::MergePullRequest, body(payload)?).await?;
    Ok(Json(json!({ "pr": output })))
}

async fn reassign_handler(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let output = run_job(&state, JobKind::ReassignReviewer, body(payload)?).await?;
    Ok(Json(output))
}

async fn stats_handler(State(state): State<ApiState>) -> Result<impl IntoResponse> {
    let counts = state.engine.reviewer_stats().await?;
    Ok(Json(json!({ "review_counts": counts })))
}
