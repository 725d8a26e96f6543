use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

/// Role within a team. `owner` may approve users and change roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    User,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::User => "user",
        }
    }
}

/// Team record: the tenancy boundary for users, credentials, projects and jobs.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub payment: String,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// User record. `app_id` is the unique login identifier (email-shaped).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub app_id: String,
    #[serde(skip_serializing)]
    pub app_password: String,
    pub role: UserRole,
    pub is_active: bool,
    pub team_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const TEAM_COLS: &str = "id, name, payment, is_active, created_at, updated_at";
const USER_COLS: &str = "id, name, app_id, app_password, role, is_active, team_id, created_at, updated_at";

impl Team {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Team>> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "SELECT {TEAM_COLS} FROM teams WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(team)
    }

    pub async fn exists_by_name(db: &PgPool, name: &str) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM teams WHERE name = $1)")
                .bind(name)
                .fetch_one(db)
                .await?;
        Ok(exists)
    }

    pub async fn create_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> anyhow::Result<Team> {
        let team = sqlx::query_as::<_, Team>(&format!(
            "INSERT INTO teams (name) VALUES ($1) RETURNING {TEAM_COLS}"
        ))
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
        Ok(team)
    }
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(user)
    }

    pub async fn find_by_app_id(db: &PgPool, app_id: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE app_id = $1"
        ))
        .bind(app_id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn exists_by_app_id(db: &PgPool, app_id: &str) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE app_id = $1)")
                .bind(app_id)
                .fetch_one(db)
                .await?;
        Ok(exists)
    }

    pub async fn list_by_team(db: &PgPool, team_id: Uuid) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE team_id = $1 ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn create_tx(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
        app_id: &str,
        password_hash: &str,
        role: UserRole,
        is_active: bool,
        team_id: Uuid,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, app_id, app_password, role, is_active, team_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLS}
            "#
        ))
        .bind(name)
        .bind(app_id)
        .bind(password_hash)
        .bind(role)
        .bind(is_active)
        .bind(team_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(user)
    }

    pub async fn count_owners_tx(
        tx: &mut Transaction<'_, Postgres>,
        team_id: Uuid,
    ) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE team_id = $1 AND role = 'owner'",
        )
        .bind(team_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(count)
    }

    pub async fn set_active_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        is_active: bool,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET is_active = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_one(&mut **tx)
        .await?;
        Ok(user)
    }

    pub async fn set_role_tx(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        role: UserRole,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET role = $2, updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLS}
            "#
        ))
        .bind(id)
        .bind(role)
        .fetch_one(&mut **tx)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_only_owner_and_user() {
        assert_eq!(UserRole::parse("owner"), Some(UserRole::Owner));
        assert_eq!(UserRole::parse("user"), Some(UserRole::User));
        assert_eq!(UserRole::parse("admin"), None);
        assert_eq!(UserRole::parse("Owner"), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Owner).unwrap(), "\"owner\"");
        assert_eq!(UserRole::User.as_str(), "user");
    }
}
