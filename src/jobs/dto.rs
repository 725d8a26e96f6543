use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub project_id: Uuid,
    #[serde(default)]
    pub system_prompt: String,
    pub question: String,
    pub model: String,
    pub credential_name: String,
    #[serde(default)]
    pub file_names: Vec<String>,
}

/// One independent job per question; partial failure across the batch is
/// expected and normal.
#[derive(Debug, Deserialize)]
pub struct SubmitBatchRequest {
    pub project_id: Uuid,
    #[serde(default)]
    pub system_prompt: String,
    pub questions: Vec<String>,
    pub model: String,
    pub credential_name: String,
    #[serde(default)]
    pub file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}
