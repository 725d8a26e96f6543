use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    credentials::{
        dto::{
            CreateCredentialRequest, CredentialListQuery, PublicCredential,
            UpdateCredentialRequest,
        },
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn credential_routes() -> Router<AppState> {
    Router::new()
        .route("/credentials", get(list_credentials).post(create_credential))
        .route(
            "/credentials/:id",
            get(get_credential)
                .put(update_credential)
                .delete(delete_credential),
        )
}

#[instrument(skip(state, auth, payload))]
pub async fn create_credential(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateCredentialRequest>,
) -> Result<(StatusCode, Json<PublicCredential>), ApiError> {
    let cred = services::create_credential(
        &state.db,
        state.provider.as_ref(),
        auth.team_id,
        &payload.name,
        payload.source_id,
        &payload.api_key,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(cred.into())))
}

#[instrument(skip(state, auth))]
pub async fn list_credentials(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<CredentialListQuery>,
) -> Result<Json<Vec<PublicCredential>>, ApiError> {
    let creds = match query.source_id {
        Some(source_id) => {
            services::list_credentials_by_source(&state.db, auth.team_id, source_id).await?
        }
        None => services::list_credentials(&state.db, auth.team_id).await?,
    };
    Ok(Json(creds.into_iter().map(PublicCredential::from).collect()))
}

#[instrument(skip(state, auth))]
pub async fn get_credential(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicCredential>, ApiError> {
    let cred = services::get_credential(&state.db, id, auth.team_id).await?;
    Ok(Json(cred.into()))
}

#[instrument(skip(state, auth, payload))]
pub async fn update_credential(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCredentialRequest>,
) -> Result<Json<PublicCredential>, ApiError> {
    let cred = services::update_credential(
        &state.db,
        state.provider.as_ref(),
        id,
        auth.team_id,
        payload.name.as_deref(),
        payload.source_id,
        payload.api_key.as_deref(),
    )
    .await?;
    Ok(Json(cred.into()))
}

#[instrument(skip(state, auth))]
pub async fn delete_credential(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete_credential(&state.db, id, auth.team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
