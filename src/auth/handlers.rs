use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangeRoleRequest, JoinTeamRequest, LoginRequest, PublicTeam,
            PublicUser, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
        },
        dto::JwtKeys,
        jwt::AuthUser,
        repo::{Team, User, UserRole},
        services,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/join", post(join_team))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/me", get(get_me))
}

pub fn team_routes() -> Router<AppState> {
    Router::new()
        .route("/teams", get(get_team))
        .route("/teams/users", get(list_team_users))
        .route("/teams/users/:id/approve", post(approve_user))
        .route("/teams/users/:id/role", put(change_role))
        .route("/teams/users/:id/deactivate", post(deactivate_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let (user, team) = services::register_with_new_team(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.password,
        &payload.team_name,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            team: team.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn join_team(
    State(state): State<AppState>,
    Json(mut payload): Json<JoinTeamRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let (user, team) = services::register_for_existing_team(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.password,
        payload.team_id,
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            team: team.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let user = services::authenticate(&state.db, &payload.email, &payload.password).await?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_access(&user)?;
    let refresh_token = keys.sign_refresh(&user)?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.refresh_access(&payload.refresh_token)?;
    Ok(Json(RefreshResponse {
        access_token,
        token_type: "bearer",
    }))
}

#[instrument(skip(state, auth))]
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or(ApiError::not_found("User"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, auth))]
pub async fn get_team(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<PublicTeam>, ApiError> {
    let team = Team::find_by_id(&state.db, auth.team_id)
        .await?
        .ok_or(ApiError::not_found("Team"))?;
    Ok(Json(team.into()))
}

#[instrument(skip(state, auth))]
pub async fn list_team_users(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = User::list_by_team(&state.db, auth.team_id).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, auth))]
pub async fn approve_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    // fast-path role check from the token; services re-verify against the db
    if auth.role != UserRole::Owner {
        return Err(ApiError::InsufficientPermission);
    }
    let user = services::approve_user(&state.db, auth.user_id, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, auth, payload))]
pub async fn change_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeRoleRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    if auth.role != UserRole::Owner {
        return Err(ApiError::InsufficientPermission);
    }
    let user = services::change_user_role(&state.db, auth.user_id, id, &payload.role).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, auth))]
pub async fn deactivate_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    if auth.role != UserRole::Owner {
        return Err(ApiError::InsufficientPermission);
    }
    let user = services::deactivate_user(&state.db, auth.user_id, id).await?;
    Ok(Json(user.into()))
}
