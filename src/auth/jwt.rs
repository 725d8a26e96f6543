use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo::{User, UserRole};
use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::state::AppState;

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_from_parts(
        &self,
        user_id: Uuid,
        app_id: &str,
        role: UserRole,
        team_id: Uuid,
        kind: TokenKind,
    ) -> Result<String, ApiError> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            app_id: app_id.to_string(),
            role,
            team_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(e.into()))?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user: &User) -> Result<String, ApiError> {
        self.sign_from_parts(user.id, &user.app_id, user.role, user.team_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user: &User) -> Result<String, ApiError> {
        self.sign_from_parts(user.id, &user.app_id, user.role, user.team_id, TokenKind::Refresh)
    }

    /// Signature + expiry + issuer/audience check. Any failure collapses to
    /// `InvalidToken`; callers never see a partially-verified result.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt verification failed");
            ApiError::InvalidToken
        })?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, ApiError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Access {
            return Err(ApiError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, ApiError> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(ApiError::InvalidToken);
        }
        Ok(claims)
    }

    /// Validates the refresh token and issues a fresh access token from its
    /// claims. The refresh token itself is not rotated.
    pub fn refresh_access(&self, refresh_token: &str) -> Result<String, ApiError> {
        let claims = self
            .verify_refresh(refresh_token)
            .map_err(|_| ApiError::TokenRefreshFailed)?;
        self.sign_from_parts(
            claims.sub,
            &claims.app_id,
            claims.role,
            claims.team_id,
            TokenKind::Access,
        )
        .map_err(|_| ApiError::TokenRefreshFailed)
    }
}

/// Extracts and validates a Bearer access token, exposing the caller's
/// identity and team scope to handlers.
pub struct AuthUser {
    pub user_id: Uuid,
    pub app_id: String,
    pub role: UserRole,
    pub team_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(ApiError::InvalidToken)?;

        let claims = keys.verify_access(token)?;
        Ok(AuthUser {
            user_id: claims.sub,
            app_id: claims.app_id,
            role: claims.role,
            team_id: claims.team_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    fn make_user(role: UserRole) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            name: "alice".into(),
            app_id: "alice@x.com".into(),
            app_password: "$argon2id$test".into(),
            role,
            is_active: true,
            team_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = make_keys();
        let user = make_user(UserRole::Owner);
        let token = keys.sign_access(&user).expect("sign access");
        let claims = keys.verify_access(&token).expect("verify token");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.app_id, "alice@x.com");
        assert_eq!(claims.role, UserRole::Owner);
        assert_eq!(claims.team_id, user.team_id);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn verify_refresh_rejects_access_token() {
        let keys = make_keys();
        let user = make_user(UserRole::User);
        let token = keys.sign_access(&user).expect("sign access");
        assert!(matches!(
            keys.verify_refresh(&token).unwrap_err(),
            ApiError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn verify_access_rejects_refresh_token() {
        let keys = make_keys();
        let user = make_user(UserRole::User);
        let token = keys.sign_refresh(&user).expect("sign refresh");
        assert!(matches!(
            keys.verify_access(&token).unwrap_err(),
            ApiError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn refresh_flow_issues_new_access_token() {
        let keys = make_keys();
        let user = make_user(UserRole::User);
        let refresh = keys.sign_refresh(&user).expect("sign refresh");
        let access = keys.refresh_access(&refresh).expect("refresh");
        let claims = keys.verify_access(&access).expect("verify new access");
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.team_id, user.team_id);
    }

    #[tokio::test]
    async fn refresh_with_garbage_fails() {
        let keys = make_keys();
        assert!(matches!(
            keys.refresh_access("not-a-token").unwrap_err(),
            ApiError::TokenRefreshFailed
        ));
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let keys = make_keys();
        let user = make_user(UserRole::User);
        let mut token = keys.sign_access(&user).expect("sign access");
        token.push('x');
        assert!(matches!(
            keys.verify(&token).unwrap_err(),
            ApiError::InvalidToken
        ));
    }
}
