use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Domain error taxonomy. Every service operation returns one of these;
/// the HTTP layer maps each kind to a status code and a tagged JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{resource} '{id}' already exists")]
    Duplicate { resource: &'static str, id: String },

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    /// Deliberately identical for "no such user" and "wrong password".
    #[error("invalid email or password")]
    AuthenticationFailed,

    #[error("account is not active; waiting for owner approval")]
    UserNotActive,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("token refresh failed; please log in again")]
    TokenRefreshFailed,

    #[error("owner role required for this action")]
    InsufficientPermission,

    #[error("approver and target user must belong to the same team")]
    TeamMismatch,

    #[error("user is already active")]
    UserAlreadyActive,

    #[error("invalid role '{0}': must be 'owner' or 'user'")]
    InvalidRole(String),

    #[error("user already has role '{0}'")]
    RoleUnchanged(String),

    #[error("a team must keep at least one owner")]
    LastOwnerProtection,

    #[error("failed to encrypt api key")]
    Encryption,

    #[error("failed to decrypt api key")]
    Decryption,

    #[error("api key validation failed: {0}")]
    ApiKeyValidation(String),

    #[error("unsupported source '{0}'")]
    UnsupportedSource(String),

    #[error("upstream service error: {0}")]
    ExternalService(String),

    #[error("upstream request timed out")]
    ExternalServiceTimeout,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn duplicate(resource: &'static str, id: impl Into<String>) -> Self {
        Self::Duplicate {
            resource,
            id: id.into(),
        }
    }

    /// Stable classification string carried in the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Duplicate { .. } => "duplicate_resource",
            Self::NotFound { .. } => "resource_not_found",
            Self::AuthenticationFailed => "authentication_failed",
            Self::UserNotActive => "user_not_active",
            Self::InvalidToken => "invalid_token",
            Self::TokenRefreshFailed => "token_refresh_failed",
            Self::InsufficientPermission => "insufficient_permission",
            Self::TeamMismatch => "team_mismatch",
            Self::UserAlreadyActive => "user_already_active",
            Self::InvalidRole(_) => "invalid_role",
            Self::RoleUnchanged(_) => "role_unchanged",
            Self::LastOwnerProtection => "last_owner_protection",
            Self::Encryption => "encryption_error",
            Self::Decryption => "decryption_error",
            Self::ApiKeyValidation(_) => "api_key_validation_error",
            Self::UnsupportedSource(_) => "unsupported_source",
            Self::ExternalService(_) => "external_service_error",
            Self::ExternalServiceTimeout => "external_service_timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidRole(_) | Self::RoleUnchanged(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Duplicate { .. } | Self::UserAlreadyActive => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AuthenticationFailed
            | Self::InvalidToken
            | Self::TokenRefreshFailed => StatusCode::UNAUTHORIZED,
            Self::UserNotActive
            | Self::InsufficientPermission
            | Self::TeamMismatch
            | Self::LastOwnerProtection => StatusCode::FORBIDDEN,
            Self::ApiKeyValidation(_) | Self::UnsupportedSource(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::ExternalServiceTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Encryption | Self::Decryption | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, kind = self.kind(), "request failed");
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // unique constraint violation surfaced by Postgres
            if db.code().as_deref() == Some("23505") {
                return ApiError::duplicate("resource", db.constraint().unwrap_or("unique"));
            }
        }
        ApiError::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(ApiError::AuthenticationFailed.kind(), "authentication_failed");
        assert_eq!(ApiError::LastOwnerProtection.kind(), "last_owner_protection");
        assert_eq!(
            ApiError::duplicate("Team", "acme").kind(),
            "duplicate_resource"
        );
    }

    #[test]
    fn auth_failures_do_not_leak_which_check_failed() {
        // the same message must cover both unknown user and wrong password
        assert_eq!(
            ApiError::AuthenticationFailed.to_string(),
            "invalid email or password"
        );
    }

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::not_found("User").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::LastOwnerProtection.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::ExternalServiceTimeout.status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
