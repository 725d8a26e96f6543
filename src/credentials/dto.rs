use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::credentials::repo::Credential;

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub name: String,
    pub source_id: Uuid,
    pub api_key: String,
}

/// Partial update: every field is independently optional.
#[derive(Debug, Deserialize)]
pub struct UpdateCredentialRequest {
    pub name: Option<String>,
    pub source_id: Option<Uuid>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CredentialListQuery {
    pub source_id: Option<Uuid>,
}

/// Credential as returned to clients. The stored ciphertext never leaves the
/// server, let alone the plaintext.
#[derive(Debug, Serialize)]
pub struct PublicCredential {
    pub id: Uuid,
    pub team_id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<Credential> for PublicCredential {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            team_id: c.team_id,
            name: c.name,
            source_id: c.source_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}
