use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::auth::repo::Team;
use crate::credentials::repo::Credential;
use crate::crypto;
use crate::error::ApiError;
use crate::provider::LlmProvider;
use crate::sources::repo::Source;

/// Probes a plaintext key against the named provider. Only `openai` keys are
/// executable; anything else is rejected up front.
pub async fn validate_api_key(
    provider: &dyn LlmProvider,
    source_name: &str,
    api_key: &str,
) -> Result<(), ApiError> {
    if !source_name.eq_ignore_ascii_case("openai") {
        return Err(ApiError::UnsupportedSource(source_name.to_string()));
    }
    if !api_key.starts_with("sk-") {
        return Err(ApiError::ApiKeyValidation(
            "openai api keys must start with 'sk-'".into(),
        ));
    }
    if !provider.probe_key(api_key).await? {
        return Err(ApiError::ApiKeyValidation(
            "the provider rejected this api key".into(),
        ));
    }
    Ok(())
}

/// Validates the key against the upstream provider, encrypts it under the
/// team's derived key and persists the credential.
pub async fn create_credential(
    db: &PgPool,
    provider: &dyn LlmProvider,
    team_id: Uuid,
    name: &str,
    source_id: Uuid,
    api_key: &str,
) -> Result<Credential, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("credential name cannot be empty".into()));
    }

    Team::find_by_id(db, team_id)
        .await?
        .ok_or(ApiError::not_found("Team"))?;
    let source = Source::find_by_id(db, source_id)
        .await?
        .ok_or(ApiError::not_found("Source"))?;

    if Credential::find_by_team_and_name(db, team_id, name)
        .await?
        .is_some()
    {
        return Err(ApiError::duplicate("Credential", name));
    }

    // hard gate: the write path requires a live, accepted key
    validate_api_key(provider, &source.name, api_key).await?;

    let encrypted = crypto::encrypt_api_key(api_key, team_id)?;
    let cred = Credential::create(db, team_id, name, source_id, &encrypted).await?;
    info!(credential_id = %cred.id, team_id = %team_id, "credential created");
    Ok(cred)
}

/// A credential belonging to another team is reported as not found; callers
/// cannot distinguish "elsewhere" from "nowhere".
fn check_team_scope(cred: Option<Credential>, team_id: Uuid) -> Result<Credential, ApiError> {
    match cred {
        Some(cred) if cred.team_id == team_id => Ok(cred),
        _ => Err(ApiError::not_found("Credential")),
    }
}

/// Team-scoped fetch.
pub async fn get_credential(
    db: &PgPool,
    credential_id: Uuid,
    team_id: Uuid,
) -> Result<Credential, ApiError> {
    let cred = Credential::find_by_id(db, credential_id).await?;
    check_team_scope(cred, team_id)
}

pub async fn list_credentials(db: &PgPool, team_id: Uuid) -> Result<Vec<Credential>, ApiError> {
    Team::find_by_id(db, team_id)
        .await?
        .ok_or(ApiError::not_found("Team"))?;
    Ok(Credential::list_by_team(db, team_id).await?)
}

pub async fn list_credentials_by_source(
    db: &PgPool,
    team_id: Uuid,
    source_id: Uuid,
) -> Result<Vec<Credential>, ApiError> {
    Team::find_by_id(db, team_id)
        .await?
        .ok_or(ApiError::not_found("Team"))?;
    Source::find_by_id(db, source_id)
        .await?
        .ok_or(ApiError::not_found("Source"))?;
    Ok(Credential::list_by_team_and_source(db, team_id, source_id).await?)
}

/// Partial update. A changed key is re-validated against the effective
/// (possibly also changing) source before re-encryption.
pub async fn update_credential(
    db: &PgPool,
    provider: &dyn LlmProvider,
    credential_id: Uuid,
    team_id: Uuid,
    name: Option<&str>,
    source_id: Option<Uuid>,
    api_key: Option<&str>,
) -> Result<Credential, ApiError> {
    let cred = get_credential(db, credential_id, team_id).await?;

    let new_name = match name {
        Some(n) => {
            let n = n.trim();
            if n.is_empty() {
                return Err(ApiError::Validation("credential name cannot be empty".into()));
            }
            if let Some(existing) = Credential::find_by_team_and_name(db, team_id, n).await? {
                if existing.id != credential_id {
                    return Err(ApiError::duplicate("Credential", n));
                }
            }
            n.to_string()
        }
        None => cred.name.clone(),
    };

    let new_source_id = match source_id {
        Some(sid) => {
            Source::find_by_id(db, sid)
                .await?
                .ok_or(ApiError::not_found("Source"))?;
            sid
        }
        None => cred.source_id,
    };

    let new_api_key = match api_key {
        Some(key) => {
            let source = Source::find_by_id(db, new_source_id)
                .await?
                .ok_or(ApiError::not_found("Source"))?;
            validate_api_key(provider, &source.name, key).await?;
            crypto::encrypt_api_key(key, team_id)?
        }
        None => cred.api_key.clone(),
    };

    let updated =
        Credential::update(db, credential_id, &new_name, new_source_id, &new_api_key).await?;
    info!(credential_id = %updated.id, "credential updated");
    Ok(updated)
}

pub async fn delete_credential(
    db: &PgPool,
    credential_id: Uuid,
    team_id: Uuid,
) -> Result<(), ApiError> {
    let cred = get_credential(db, credential_id, team_id).await?;
    Credential::delete(db, cred.id).await?;
    info!(credential_id = %credential_id, "credential deleted");
    Ok(())
}

/// Internal capability for the job worker: resolve a team's credential by
/// name and return the transient plaintext key with its source. The plaintext
/// is never persisted or logged.
pub async fn decrypt_for_use(
    db: &PgPool,
    team_id: Uuid,
    credential_name: &str,
) -> Result<(String, Source), ApiError> {
    let cred = Credential::find_by_team_and_name(db, team_id, credential_name)
        .await?
        .ok_or(ApiError::not_found("Credential"))?;
    let source = Source::find_by_id(db, cred.source_id)
        .await?
        .ok_or(ApiError::not_found("Source"))?;
    let plaintext = crypto::decrypt_api_key(&cred.api_key, team_id)?;
    Ok((plaintext, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;
    use axum::async_trait;
    use time::OffsetDateTime;

    fn credential(team_id: Uuid) -> Credential {
        let now = OffsetDateTime::now_utc();
        Credential {
            id: Uuid::new_v4(),
            team_id,
            name: "openai-main".into(),
            source_id: Uuid::new_v4(),
            api_key: "ciphertext".into(),
            created_at: now,
            updated_at: now,
        }
    }

    struct StubProvider {
        accept: bool,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn probe_key(&self, _api_key: &str) -> Result<bool, ApiError> {
            Ok(self.accept)
        }

        async fn chat(
            &self,
            _api_key: &str,
            _model: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, ApiError> {
            Ok("stub".into())
        }
    }

    #[tokio::test]
    async fn only_openai_sources_are_supported() {
        let provider = StubProvider { accept: true };
        let err = validate_api_key(&provider, "anthropic", "sk-abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedSource(_)));
    }

    #[tokio::test]
    async fn key_format_is_checked_before_the_probe() {
        let provider = StubProvider { accept: true };
        let err = validate_api_key(&provider, "openai", "not-a-key")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ApiKeyValidation(_)));
    }

    #[tokio::test]
    async fn rejected_probe_fails_validation() {
        let provider = StubProvider { accept: false };
        let err = validate_api_key(&provider, "openai", "sk-abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ApiKeyValidation(_)));
    }

    #[tokio::test]
    async fn accepted_probe_passes() {
        let provider = StubProvider { accept: true };
        assert!(validate_api_key(&provider, "OpenAI", "sk-abc").await.is_ok());
    }

    #[test]
    fn own_team_credential_is_returned() {
        let team = Uuid::new_v4();
        let cred = credential(team);
        let id = cred.id;
        assert_eq!(check_team_scope(Some(cred), team).unwrap().id, id);
    }

    #[test]
    fn other_team_credential_reads_as_missing() {
        // even with the correct id, a caller from another team sees the same
        // error as for a credential that does not exist at all
        let foreign = check_team_scope(Some(credential(Uuid::new_v4())), Uuid::new_v4())
            .unwrap_err();
        let missing = check_team_scope(None, Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            foreign,
            ApiError::NotFound {
                resource: "Credential"
            }
        ));
        assert_eq!(foreign.to_string(), missing.to_string());
        assert_eq!(foreign.kind(), missing.kind());
    }
}
