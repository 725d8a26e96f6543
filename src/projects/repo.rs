use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Grouping namespace for jobs and uploaded files, unique per team by name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const COLS: &str = "id, team_id, name, created_at, updated_at";

impl Project {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {COLS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(project)
    }

    pub async fn find_by_team_and_name(
        db: &PgPool,
        team_id: Uuid,
        name: &str,
    ) -> anyhow::Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {COLS} FROM projects WHERE team_id = $1 AND name = $2"
        ))
        .bind(team_id)
        .bind(name)
        .fetch_optional(db)
        .await?;
        Ok(project)
    }

    pub async fn list_by_team(db: &PgPool, team_id: Uuid) -> anyhow::Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {COLS} FROM projects WHERE team_id = $1 ORDER BY created_at"
        ))
        .bind(team_id)
        .fetch_all(db)
        .await?;
        Ok(projects)
    }

    pub async fn create(db: &PgPool, team_id: Uuid, name: &str) -> anyhow::Result<Project> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "INSERT INTO projects (team_id, name) VALUES ($1, $2) RETURNING {COLS}"
        ))
        .bind(team_id)
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(project)
    }

    pub async fn rename(db: &PgPool, id: Uuid, name: &str) -> anyhow::Result<Project> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "UPDATE projects SET name = $2, updated_at = now() WHERE id = $1 RETURNING {COLS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_one(db)
        .await?;
        Ok(project)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
