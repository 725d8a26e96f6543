use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::projects::repo::Project;

/// Text-ish attachments only; job workers read them back as UTF-8 context.
const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "log"];

pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub async fn create_project(db: &PgPool, team_id: Uuid, name: &str) -> Result<Project, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("project name cannot be empty".into()));
    }
    if Project::find_by_team_and_name(db, team_id, name)
        .await?
        .is_some()
    {
        return Err(ApiError::duplicate("Project", name));
    }
    let project = Project::create(db, team_id, name).await?;
    info!(project_id = %project.id, team_id = %team_id, "project created");
    Ok(project)
}

/// Team-scoped fetch; other teams' projects are indistinguishable from
/// missing ones.
pub async fn get_project(
    db: &PgPool,
    project_id: Uuid,
    team_id: Uuid,
) -> Result<Project, ApiError> {
    let project = Project::find_by_id(db, project_id)
        .await?
        .ok_or(ApiError::not_found("Project"))?;
    if project.team_id != team_id {
        return Err(ApiError::not_found("Project"));
    }
    Ok(project)
}

pub async fn list_projects(db: &PgPool, team_id: Uuid) -> Result<Vec<Project>, ApiError> {
    Ok(Project::list_by_team(db, team_id).await?)
}

pub async fn update_project(
    db: &PgPool,
    project_id: Uuid,
    team_id: Uuid,
    name: &str,
) -> Result<Project, ApiError> {
    let project = get_project(db, project_id, team_id).await?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("project name cannot be empty".into()));
    }
    if let Some(existing) = Project::find_by_team_and_name(db, team_id, name).await? {
        if existing.id != project.id {
            return Err(ApiError::duplicate("Project", name));
        }
    }
    let updated = Project::rename(db, project.id, name).await?;
    info!(project_id = %updated.id, "project renamed");
    Ok(updated)
}

pub async fn delete_project(db: &PgPool, project_id: Uuid, team_id: Uuid) -> Result<(), ApiError> {
    let project = get_project(db, project_id, team_id).await?;
    Project::delete(db, project.id).await?;
    info!(project_id = %project_id, "project deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allowlist() {
        assert!(is_allowed_extension("notes.txt"));
        assert!(is_allowed_extension("README.MD"));
        assert!(is_allowed_extension("data.csv"));
        assert!(!is_allowed_extension("binary.exe"));
        assert!(!is_allowed_extension("archive.tar.gz"));
        assert!(!is_allowed_extension("no_extension"));
    }
}
