use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Catalog entry identifying an upstream LLM provider (e.g. "openai").
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
}

impl Source {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>(
            "SELECT id, name, created_at FROM sources WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(source)
    }

    pub async fn exists_by_name(db: &PgPool, name: &str) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sources WHERE name = $1)")
                .bind(name)
                .fetch_one(db)
                .await?;
        Ok(exists)
    }

    pub async fn list(db: &PgPool) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>(
            "SELECT id, name, created_at FROM sources ORDER BY name",
        )
        .fetch_all(db)
        .await?;
        Ok(sources)
    }

    pub async fn create(db: &PgPool, name: &str) -> anyhow::Result<Source> {
        let source = sqlx::query_as::<_, Source>(
            "INSERT INTO sources (name) VALUES ($1) RETURNING id, name, created_at",
        )
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(source)
    }
}
