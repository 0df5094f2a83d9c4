//! Task backlog store: the agent-maintained and operator-maintained task lists.
//!
//! Both sources are opaque text. Reading merges them; updating replaces the
//! agent list and clears the operator list, in that order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, error, instrument};

use crate::core::types::Backlog;

/// Reads and writes the two backlog sources.
#[derive(Debug, Clone)]
pub struct TaskBacklog {
    ai_path: PathBuf,
    user_path: PathBuf,
}

impl TaskBacklog {
    pub fn new(ai_path: impl Into<PathBuf>, user_path: impl Into<PathBuf>) -> Self {
        Self {
            ai_path: ai_path.into(),
            user_path: user_path.into(),
        }
    }

    /// Read both sources concurrently. A missing source reads as empty.
    #[instrument(skip(self))]
    pub async fn read(&self) -> Result<Backlog> {
        let (ai, user) = tokio::try_join!(
            read_or_empty(&self.ai_path),
            read_or_empty(&self.user_path)
        )?;
        debug!(ai_bytes = ai.len(), user_bytes = user.len(), "read backlog");
        Ok(Backlog { ai, user })
    }

    /// Replace the agent list with `ai_tasks` and clear the operator list.
    ///
    /// Not transactional: if clearing the operator list fails, the agent list
    /// has already been replaced.
    #[instrument(skip_all, fields(bytes = ai_tasks.len()))]
    pub async fn update(&self, ai_tasks: &str) -> bool {
        match self.try_update(ai_tasks).await {
            Ok(()) => true,
            Err(err) => {
                error!(error = %format!("{err:#}"), "failed to update tasks");
                false
            }
        }
    }

    async fn try_update(&self, ai_tasks: &str) -> Result<()> {
        write_with_parents(&self.ai_path, ai_tasks).await?;
        write_with_parents(&self.user_path, "").await?;
        Ok(())
    }
}

async fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

async fn write_with_parents(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents)
        .await
        .with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    fn backlog_in(root: &Path) -> TaskBacklog {
        TaskBacklog::new(root.join(".ai-tasks.md"), root.join("tasks.md"))
    }

    #[tokio::test]
    async fn missing_sources_read_as_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backlog = backlog_in(temp.path());

        assert_eq!(backlog.read().await.expect("read"), Backlog::default());
    }

    #[tokio::test]
    async fn read_returns_contents_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        std_fs::write(temp.path().join(".ai-tasks.md"), "1. refactor\n").expect("ai");
        std_fs::write(temp.path().join("tasks.md"), "add docs").expect("user");

        let read = backlog_in(temp.path()).read().await.expect("read");
        assert_eq!(read.ai, "1. refactor\n");
        assert_eq!(read.user, "add docs");
    }

    #[tokio::test]
    async fn update_replaces_ai_tasks_and_clears_user_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        std_fs::write(temp.path().join("tasks.md"), "please fix the bug").expect("user");
        let backlog = backlog_in(temp.path());

        assert!(backlog.update("X").await);
        let read = backlog.read().await.expect("read");
        assert_eq!(
            read,
            Backlog {
                ai: "X".to_string(),
                user: String::new(),
            }
        );
    }

    #[tokio::test]
    async fn update_creates_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let backlog = TaskBacklog::new(
            temp.path().join("state/ai/tasks.md"),
            temp.path().join("tasks.md"),
        );

        assert!(backlog.update("1. first").await);
        assert_eq!(
            std_fs::read_to_string(temp.path().join("state/ai/tasks.md")).expect("read"),
            "1. first"
        );
    }

    #[tokio::test]
    async fn update_reports_failure_and_keeps_ai_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        std_fs::write(temp.path().join("blocker"), "file").expect("blocker");
        let backlog = TaskBacklog::new(
            temp.path().join(".ai-tasks.md"),
            temp.path().join("blocker/tasks.md"),
        );

        assert!(!backlog.update("new list").await);
        assert_eq!(
            std_fs::read_to_string(temp.path().join(".ai-tasks.md")).expect("read"),
            "new list"
        );
    }

    #[tokio::test]
    async fn read_fails_when_source_is_unreadable() {
        let temp = tempfile::tempdir().expect("tempdir");
        std_fs::create_dir_all(temp.path().join("tasks.md")).expect("dir in place of file");

        assert!(backlog_in(temp.path()).read().await.is_err());
    }
}
