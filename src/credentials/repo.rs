use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Team-scoped named API key. `api_key` holds the ciphertext token produced
/// by the team cipher; plaintext is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const COLS: &str = "id, team_id, name, source_id, api_key, created_at, updated_at";

impl Credential {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Credential>> {
        let cred = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {COLS} FROM credentials WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(cred)
    }

    pub async fn find_by_team_and_name(
        db: &PgPool,
        team_id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Credential>> {
        let cred = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {COLS} FROM credentials WHERE team_id = $1 AND name = $2"
        ))
        .bind(team_id)
        .bind(name)
        .fetch_optional(db)
        .await?;
        Ok(cred)
    }

    pub async fn list_by_team(db: &PgPool, team_id: Uuid) -> anyhow::Result<Vec<Credential>> {
        let creds = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {COLS} FROM credentials WHERE team_id = $1 ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(db)
        .await?;
        Ok(creds)
    }

    pub async fn list_by_team_and_source(
        db: &PgPool,
        team_id: Uuid,
        source_id: Uuid,
    ) -> anyhow::Result<Vec<Credential>> {
        let creds = sqlx::query_as::<_, Credential>(&format!(
            "SELECT {COLS} FROM credentials WHERE team_id = $1 AND source_id = $2 ORDER BY created_at"
        ))
        .bind(team_id)
        .bind(source_id)
        .fetch_all(db)
        .await?;
        Ok(creds)
    }

    pub async fn create(
        db: &PgPool,
        team_id: Uuid,
        name: &str,
        source_id: Uuid,
        encrypted_api_key: &str,
    ) -> anyhow::Result<Credential> {
        let cred = sqlx::query_as::<_, Credential>(&format!(
            r#"
            INSERT INTO credentials (team_id, name, source_id, api_key)
            VALUES ($1, $2, $3, $4)
            RETURNING {COLS}
            "#
        ))
        .bind(team_id)
        .bind(name)
        .bind(source_id)
        .bind(encrypted_api_key)
        .fetch_one(db)
        .await?;
        Ok(cred)
    }

    pub async fn update(
        db: &PgPool,
        id: Uuid,
        name: &str,
        source_id: Uuid,
        encrypted_api_key: &str,
    ) -> anyhow::Result<Credential> {
        let cred = sqlx::query_as::<_, Credential>(&format!(
            r#"
            UPDATE credentials
            SET name = $2, source_id = $3, api_key = $4, updated_at = now()
            WHERE id = $1
            RETURNING {COLS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(source_id)
        .bind(encrypted_api_key)
        .fetch_one(db)
        .await?;
        Ok(cred)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
