use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    jobs::{
        dto::{JobListQuery, SubmitBatchRequest, SubmitJobRequest},
        repo::LlmRequest,
        services,
    },
    state::AppState,
};

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/batch", post(submit_batch))
        .route("/jobs/:id", get(get_job).delete(delete_job))
}

#[instrument(skip(state, auth, payload))]
pub async fn submit_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<LlmRequest>), ApiError> {
    let job = services::submit(
        &state.db,
        &state.jobs,
        auth.team_id,
        auth.user_id,
        payload.project_id,
        &payload.system_prompt,
        &payload.question,
        &payload.model,
        &payload.credential_name,
        &payload.file_names,
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

#[instrument(skip(state, auth, payload))]
pub async fn submit_batch(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SubmitBatchRequest>,
) -> Result<(StatusCode, Json<Vec<LlmRequest>>), ApiError> {
    let jobs = services::submit_batch(
        &state.db,
        &state.jobs,
        auth.team_id,
        auth.user_id,
        payload.project_id,
        &payload.system_prompt,
        &payload.questions,
        &payload.model,
        &payload.credential_name,
        &payload.file_names,
    )
    .await?;
    Ok((StatusCode::ACCEPTED, Json(jobs)))
}

#[instrument(skip(state, auth))]
pub async fn list_jobs(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<LlmRequest>>, ApiError> {
    let jobs =
        services::list_jobs(&state.db, auth.team_id, query.project_id, query.user_id).await?;
    Ok(Json(jobs))
}

#[instrument(skip(state, auth))]
pub async fn get_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LlmRequest>, ApiError> {
    Ok(Json(services::get_job(&state.db, id, auth.team_id).await?))
}

#[instrument(skip(state, auth))]
pub async fn delete_job(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete_job(&state.db, id, auth.team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
