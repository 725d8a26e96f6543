use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::jobs::repo::LlmRequest;
use crate::jobs::worker::{JobMessage, JobQueue};
use crate::projects::services::get_project;

/// Creates the job row in `pending` state, hands it to the worker queue and
/// returns immediately. Execution happens out-of-band.
#[allow(clippy::too_many_arguments)]
pub async fn submit(
    db: &PgPool,
    queue: &JobQueue,
    team_id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    system_prompt: &str,
    question: &str,
    model: &str,
    credential_name: &str,
    file_names: &[String],
) -> Result<LlmRequest, ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::Validation("question cannot be empty".into()));
    }
    if model.trim().is_empty() {
        return Err(ApiError::Validation("model name cannot be empty".into()));
    }
    // ownership gate: the project must belong to the caller's team
    get_project(db, project_id, team_id).await?;

    let job = LlmRequest::create(
        db,
        team_id,
        user_id,
        project_id,
        system_prompt,
        question,
        model,
        file_names,
    )
    .await?;

    queue.dispatch(JobMessage {
        job_id: job.id,
        credential_name: credential_name.to_string(),
    });
    info!(job_id = %job.id, team_id = %team_id, "job submitted");
    Ok(job)
}

/// One independent job per question. Jobs succeed or fail individually; there
/// is no rollback across the batch.
#[allow(clippy::too_many_arguments)]
pub async fn submit_batch(
    db: &PgPool,
    queue: &JobQueue,
    team_id: Uuid,
    user_id: Uuid,
    project_id: Uuid,
    system_prompt: &str,
    questions: &[String],
    model: &str,
    credential_name: &str,
    file_names: &[String],
) -> Result<Vec<LlmRequest>, ApiError> {
    if questions.is_empty() {
        return Err(ApiError::Validation("questions cannot be empty".into()));
    }
    let mut jobs = Vec::with_capacity(questions.len());
    for question in questions {
        let job = submit(
            db,
            queue,
            team_id,
            user_id,
            project_id,
            system_prompt,
            question,
            model,
            credential_name,
            file_names,
        )
        .await?;
        jobs.push(job);
    }
    Ok(jobs)
}

/// Team-scoped fetch; jobs of other teams read as missing.
pub async fn get_job(db: &PgPool, job_id: Uuid, team_id: Uuid) -> Result<LlmRequest, ApiError> {
    let job = LlmRequest::find_by_id(db, job_id)
        .await?
        .ok_or(ApiError::not_found("Job"))?;
    if job.team_id != team_id {
        return Err(ApiError::not_found("Job"));
    }
    Ok(job)
}

pub async fn list_jobs(
    db: &PgPool,
    team_id: Uuid,
    project_id: Option<Uuid>,
    user_id: Option<Uuid>,
) -> Result<Vec<LlmRequest>, ApiError> {
    if let Some(project_id) = project_id {
        get_project(db, project_id, team_id).await?;
        return Ok(LlmRequest::list_by_project(db, team_id, project_id).await?);
    }
    if let Some(user_id) = user_id {
        return Ok(LlmRequest::list_by_user(db, team_id, user_id).await?);
    }
    Ok(LlmRequest::list_by_team(db, team_id).await?)
}

pub async fn delete_job(db: &PgPool, job_id: Uuid, team_id: Uuid) -> Result<(), ApiError> {
    let job = get_job(db, job_id, team_id).await?;
    LlmRequest::delete(db, job.id).await?;
    info!(job_id = %job_id, "job deleted");
    Ok(())
}
