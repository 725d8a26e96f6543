use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::credentials::services::decrypt_for_use;
use crate::error::ApiError;
use crate::jobs::repo::{JobStatus, LlmRequest};
use crate::provider::{ChatMessage, LlmProvider};
use crate::storage::FileStore;

/// Description of one unit of background work. The credential is resolved by
/// name at execution time, inside the job's own team scope.
#[derive(Debug)]
pub struct JobMessage {
    pub job_id: Uuid,
    pub credential_name: String,
}

/// Handle for submitting jobs to the background worker. Submission never
/// blocks; execution runs detached from the request/response cycle with its
/// own pool handle, because the submitting call's transaction has already
/// committed by the time the job runs.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobMessage>,
    // present only on queues with no worker: holds the receiver so the
    // channel stays open while nothing drains it
    idle_rx: Option<Arc<mpsc::UnboundedReceiver<JobMessage>>>,
}

impl JobQueue {
    /// Spawns the dispatcher task. Each dequeued job executes in its own
    /// spawned task, so jobs run concurrently and in no particular order.
    pub fn start(db: PgPool, files: Arc<dyn FileStore>, provider: Arc<dyn LlmProvider>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobMessage>();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let db = db.clone();
                let files = files.clone();
                let provider = provider.clone();
                tokio::spawn(async move {
                    execute_job(&db, files.as_ref(), provider.as_ref(), msg).await;
                });
            }
            info!("job queue closed; dispatcher exiting");
        });
        Self { tx, idle_rx: None }
    }

    /// Queue handle with no worker behind it, for tests and fake state.
    pub fn disconnected() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<JobMessage>();
        Self {
            tx,
            idle_rx: Some(Arc::new(rx)),
        }
    }

    pub fn dispatch(&self, msg: JobMessage) {
        if let Err(e) = self.tx.send(msg) {
            error!(job_id = %e.0.job_id, "job queue is closed; job will stay pending");
        }
    }
}

/// Runs one job to a terminal state. Failures are recorded on the job row,
/// never propagated: the submitting call has already returned.
pub async fn execute_job(
    db: &PgPool,
    files: &dyn FileStore,
    provider: &dyn LlmProvider,
    msg: JobMessage,
) {
    let job = match LlmRequest::find_by_id(db, msg.job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(job_id = %msg.job_id, "job vanished before execution");
            return;
        }
        Err(e) => {
            error!(job_id = %msg.job_id, error = %e, "failed to load job");
            return;
        }
    };

    if !job.status.can_transition_to(JobStatus::Processing) {
        if job.status.is_terminal() {
            warn!(job_id = %job.id, status = ?job.status, "job already finished; skipping");
        } else {
            warn!(job_id = %job.id, status = ?job.status, "job already claimed; skipping");
        }
        return;
    }

    match LlmRequest::mark_processing(db, job.id).await {
        Ok(true) => {}
        Ok(false) => {
            // lost the claim race to another worker between load and update
            warn!(job_id = %job.id, "job was not pending; skipping execution");
            return;
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "failed to mark job processing");
            return;
        }
    }

    match run_job(db, files, provider, &job, &msg.credential_name).await {
        Ok(result) => {
            if let Err(e) = LlmRequest::mark_completed(db, job.id, &result).await {
                error!(job_id = %job.id, error = %e, "failed to record job result");
            } else {
                info!(job_id = %job.id, "job completed");
            }
        }
        Err(err) => {
            let message = err.to_string();
            if let Err(e) = LlmRequest::mark_failed(db, job.id, &message).await {
                error!(job_id = %job.id, error = %e, "failed to record job failure");
            } else {
                info!(job_id = %job.id, error = %message, "job failed");
            }
        }
    }
}

async fn run_job(
    db: &PgPool,
    files: &dyn FileStore,
    provider: &dyn LlmProvider,
    job: &LlmRequest,
    credential_name: &str,
) -> Result<String, ApiError> {
    let (api_key, source) = decrypt_for_use(db, job.team_id, credential_name)
        .await
        .map_err(|e| match e {
            ApiError::NotFound { resource: "Credential" } => {
                ApiError::ApiKeyValidation(format!("credential '{credential_name}' not found"))
            }
            other => other,
        })?;

    if !source.name.eq_ignore_ascii_case("openai") {
        return Err(ApiError::UnsupportedSource(source.name));
    }

    let mut file_contents = Vec::new();
    for name in &job.file_names {
        match files.read_text(job.team_id, job.project_id, name).await {
            Ok(content) => file_contents.push((name.clone(), content)),
            Err(e) => {
                // missing or unreadable attachments are skipped, not fatal
                warn!(job_id = %job.id, file = %name, error = %e, "failed to read attachment");
            }
        }
    }

    let messages = build_messages(&job.system_prompt, &job.question, &file_contents);
    provider.chat(&api_key, &job.model_name, &messages).await
}

/// Builds the upstream message list: system prompt (when present), the
/// question, and one extra user message carrying attachment contents.
fn build_messages(
    system_prompt: &str,
    question: &str,
    file_contents: &[(String, String)],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(3);
    if !system_prompt.trim().is_empty() {
        messages.push(ChatMessage::system(system_prompt));
    }
    messages.push(ChatMessage::user(question));
    if !file_contents.is_empty() {
        let combined = file_contents
            .iter()
            .map(|(name, content)| format!("File: {name}\nContent:\n{content}"))
            .collect::<Vec<_>>()
            .join("\n\n");
        messages.push(ChatMessage::user(format!(
            "Use the following attached files as additional context:\n\n{combined}"
        )));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_messages_without_attachments() {
        let messages = build_messages("be terse", "what is rust?", &[]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "what is rust?");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let messages = build_messages("   ", "hi", &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn attachments_become_one_context_message() {
        let files = vec![
            ("a.txt".to_string(), "alpha".to_string()),
            ("b.md".to_string(), "beta".to_string()),
        ];
        let messages = build_messages("", "summarize", &files);
        assert_eq!(messages.len(), 2);
        let context = &messages[1].content;
        assert!(context.contains("File: a.txt"));
        assert!(context.contains("alpha"));
        assert!(context.contains("File: b.md"));
        assert!(context.contains("beta"));
    }

    #[tokio::test]
    async fn disconnected_queue_accepts_messages() {
        let queue = JobQueue::disconnected();
        queue.dispatch(JobMessage {
            job_id: Uuid::new_v4(),
            credential_name: "openai-main".into(),
        });
        // clones share the open channel
        queue.clone().dispatch(JobMessage {
            job_id: Uuid::new_v4(),
            credential_name: "openai-main".into(),
        });
    }
}
