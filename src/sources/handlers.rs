use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, sources::repo::Source, state::AppState};

pub fn source_routes() -> Router<AppState> {
    Router::new()
        .route("/sources", get(list_sources).post(create_source))
        .route("/sources/:id", get(get_source))
}

#[derive(Debug, Deserialize)]
pub struct CreateSourceRequest {
    pub name: String,
}

#[instrument(skip(state, _auth))]
pub async fn list_sources(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<Source>>, ApiError> {
    Ok(Json(Source::list(&state.db).await?))
}

#[instrument(skip(state, _auth))]
pub async fn get_source(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Source>, ApiError> {
    let source = Source::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::not_found("Source"))?;
    Ok(Json(source))
}

#[instrument(skip(state, _auth, payload))]
pub async fn create_source(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<CreateSourceRequest>,
) -> Result<(StatusCode, Json<Source>), ApiError> {
    let name = payload.name.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::Validation("source name cannot be empty".into()));
    }
    if Source::exists_by_name(&state.db, &name).await? {
        return Err(ApiError::duplicate("Source", name));
    }
    let source = Source::create(&state.db, &name).await?;
    Ok((StatusCode::CREATED, Json(source)))
}
