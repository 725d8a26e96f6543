use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Job lifecycle: pending → processing → completed | failed. Terminal states
/// are final; a failed job is retried by submitting a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Forward-only transitions; everything else is rejected.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One asynchronous LLM invocation on behalf of a team/user/project.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LlmRequest {
    pub id: Uuid,
    pub team_id: Uuid,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub system_prompt: String,
    pub question: String,
    pub model_name: String,
    pub file_names: Vec<String>,
    pub status: JobStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const COLS: &str = "id, team_id, user_id, project_id, system_prompt, question, model_name, \
                    file_names, status, result, error_message, created_at, updated_at";

impl LlmRequest {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
        project_id: Uuid,
        system_prompt: &str,
        question: &str,
        model_name: &str,
        file_names: &[String],
    ) -> anyhow::Result<LlmRequest> {
        let job = sqlx::query_as::<_, LlmRequest>(&format!(
            r#"
            INSERT INTO llm_requests
                (team_id, user_id, project_id, system_prompt, question, model_name, file_names)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {COLS}
            "#
        ))
        .bind(team_id)
        .bind(user_id)
        .bind(project_id)
        .bind(system_prompt)
        .bind(question)
        .bind(model_name)
        .bind(file_names)
        .fetch_one(db)
        .await?;
        Ok(job)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<LlmRequest>> {
        let job = sqlx::query_as::<_, LlmRequest>(&format!(
            "SELECT {COLS} FROM llm_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(job)
    }

    pub async fn list_by_team(db: &PgPool, team_id: Uuid) -> anyhow::Result<Vec<LlmRequest>> {
        let jobs = sqlx::query_as::<_, LlmRequest>(&format!(
            "SELECT {COLS} FROM llm_requests WHERE team_id = $1 ORDER BY created_at DESC"
        ))
        .bind(team_id)
        .fetch_all(db)
        .await?;
        Ok(jobs)
    }

    pub async fn list_by_project(
        db: &PgPool,
        team_id: Uuid,
        project_id: Uuid,
    ) -> anyhow::Result<Vec<LlmRequest>> {
        let jobs = sqlx::query_as::<_, LlmRequest>(&format!(
            "SELECT {COLS} FROM llm_requests WHERE team_id = $1 AND project_id = $2 \
             ORDER BY created_at DESC"
        ))
        .bind(team_id)
        .bind(project_id)
        .fetch_all(db)
        .await?;
        Ok(jobs)
    }

    pub async fn list_by_user(
        db: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Vec<LlmRequest>> {
        let jobs = sqlx::query_as::<_, LlmRequest>(&format!(
            "SELECT {COLS} FROM llm_requests WHERE team_id = $1 AND user_id = $2 \
             ORDER BY created_at DESC"
        ))
        .bind(team_id)
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(jobs)
    }

    /// pending → processing. The status guard in the WHERE clause makes the
    /// transition forward-only even under concurrent workers.
    pub async fn mark_processing(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE llm_requests SET status = 'processing', updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// processing → completed; `result` is only ever set here.
    pub async fn mark_completed(db: &PgPool, id: Uuid, result_text: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE llm_requests SET status = 'completed', result = $2, updated_at = now() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(result_text)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// processing → failed; `error_message` is only ever set here.
    pub async fn mark_failed(db: &PgPool, id: Uuid, error_message: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE llm_requests SET status = 'failed', error_message = $2, updated_at = now() \
             WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error_message)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM llm_requests WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_are_forward_only() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // never skips processing, never reverses, terminal states are final
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
