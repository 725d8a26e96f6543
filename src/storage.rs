use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use uuid::Uuid;

/// Team/project-scoped file storage for uploaded attachments.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(
        &self,
        team_id: Uuid,
        project_id: Uuid,
        filename: &str,
        body: Bytes,
    ) -> anyhow::Result<String>;

    async fn read_text(
        &self,
        team_id: Uuid,
        project_id: Uuid,
        filename: &str,
    ) -> anyhow::Result<String>;

    async fn list(&self, team_id: Uuid, project_id: Uuid) -> anyhow::Result<Vec<String>>;
}

/// Rejects filenames that could escape the team/project directory.
pub fn sanitize_filename(filename: &str) -> Option<&str> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.starts_with('.')
    {
        return None;
    }
    Some(filename)
}

/// Plain local-filesystem store rooted at the configured upload directory.
/// Files live under `<root>/<team_id>/<project_id>/<filename>`.
#[derive(Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn scope(&self, team_id: Uuid, project_id: Uuid) -> PathBuf {
        self.root
            .join(team_id.to_string())
            .join(project_id.to_string())
    }
}

#[async_trait]
impl FileStore for LocalFiles {
    async fn save(
        &self,
        team_id: Uuid,
        project_id: Uuid,
        filename: &str,
        body: Bytes,
    ) -> anyhow::Result<String> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| anyhow::anyhow!("invalid filename {filename:?}"))?;
        let dir = self.scope(team_id, project_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create upload dir {}", dir.display()))?;
        let path = dir.join(name);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(name.to_string())
    }

    async fn read_text(
        &self,
        team_id: Uuid,
        project_id: Uuid,
        filename: &str,
    ) -> anyhow::Result<String> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| anyhow::anyhow!("invalid filename {filename:?}"))?;
        let path = self.scope(team_id, project_id).join(name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("read upload {}", path.display()))
    }

    async fn list(&self, team_id: Uuid, project_id: Uuid) -> anyhow::Result<Vec<String>> {
        let dir = self.scope(team_id, project_id);
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            // no uploads yet for this project
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e).with_context(|| format!("list uploads {}", dir.display())),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_path_escapes() {
        assert_eq!(sanitize_filename("notes.txt"), Some("notes.txt"));
        assert_eq!(sanitize_filename("a/b.txt"), None);
        assert_eq!(sanitize_filename("..\\evil"), None);
        assert_eq!(sanitize_filename("../etc/passwd"), None);
        assert_eq!(sanitize_filename(".hidden"), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[tokio::test]
    async fn save_read_list_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalFiles::new(dir.path());
        let team = Uuid::new_v4();
        let project = Uuid::new_v4();

        store
            .save(team, project, "b.txt", Bytes::from_static(b"beta"))
            .await
            .expect("save b");
        store
            .save(team, project, "a.txt", Bytes::from_static(b"alpha"))
            .await
            .expect("save a");

        assert_eq!(
            store.read_text(team, project, "a.txt").await.unwrap(),
            "alpha"
        );
        assert_eq!(
            store.list(team, project).await.unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );

        // other projects see nothing
        assert!(store.list(team, Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalFiles::new(dir.path());
        let err = store
            .save(
                Uuid::new_v4(),
                Uuid::new_v4(),
                "../escape.txt",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid filename"));
    }
}
