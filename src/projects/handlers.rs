use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiError,
    projects::{
        dto::{CreateProjectRequest, FileListResponse, FileUploadResponse, UpdateProjectRequest},
        repo::Project,
        services,
    },
    state::AppState,
    storage::sanitize_filename,
};

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}

pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/projects/:id/files", get(list_files).post(upload_file))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)) // 10MB
}

#[instrument(skip(state, auth, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let project = services::create_project(&state.db, auth.team_id, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[instrument(skip(state, auth))]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(services::list_projects(&state.db, auth.team_id).await?))
}

#[instrument(skip(state, auth))]
pub async fn get_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(services::get_project(&state.db, id, auth.team_id).await?))
}

#[instrument(skip(state, auth, payload))]
pub async fn update_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    Ok(Json(
        services::update_project(&state.db, id, auth.team_id, &payload.name).await?,
    ))
}

#[instrument(skip(state, auth))]
pub async fn delete_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    services::delete_project(&state.db, id, auth.team_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /projects/:id/files (multipart, field `file`)
#[instrument(skip(state, auth, mp))]
pub async fn upload_file(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<FileUploadResponse>), ApiError> {
    let project = services::get_project(&state.db, id, auth.team_id).await?;

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .and_then(sanitize_filename)
            .ok_or_else(|| ApiError::Validation("missing or invalid filename".into()))?
            .to_string();
        if !services::is_allowed_extension(&filename) {
            return Err(ApiError::Validation(format!(
                "file type not allowed: {filename}"
            )));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?;

        let stored = state
            .files
            .save(auth.team_id, project.id, &filename, data)
            .await
            .map_err(ApiError::Internal)?;
        return Ok((
            StatusCode::CREATED,
            Json(FileUploadResponse { filename: stored }),
        ));
    }

    warn!("multipart upload without a 'file' field");
    Err(ApiError::Validation("multipart field 'file' is required".into()))
}

#[instrument(skip(state, auth))]
pub async fn list_files(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FileListResponse>, ApiError> {
    let project = services::get_project(&state.db, id, auth.team_id).await?;
    let files = state
        .files
        .list(auth.team_id, project.id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(FileListResponse { files }))
}
