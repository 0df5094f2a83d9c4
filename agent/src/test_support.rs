//! Test-only helpers: throwaway repositories and scripted model services.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use crate::agent::FORCE_COMMIT_PROMPT;
use crate::core::types::Invocation;
use crate::io::git::{Git, IgnoreOracle};
use crate::io::model::{ModelMessage, ModelService};
use crate::io::workspace::Workspace;

/// Shorthand for building an invocation.
pub fn invoke(name: &str, arguments: Value) -> Invocation {
    Invocation::new(name, arguments)
}

/// Ignore oracle backed by a fixed set of root-relative paths.
#[derive(Debug, Clone, Default)]
pub struct StaticIgnore {
    paths: HashSet<String>,
}

impl StaticIgnore {
    pub fn new(paths: &[&str]) -> Self {
        Self {
            paths: paths.iter().map(|path| path.to_string()).collect(),
        }
    }
}

impl IgnoreOracle for StaticIgnore {
    fn ignored(&self, paths: &[String]) -> HashSet<String> {
        paths
            .iter()
            .filter(|path| self.paths.contains(*path))
            .cloned()
            .collect()
    }
}

/// A temporary git repository used as a project root.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        Git::new(dir.path()).init()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to a root-relative path, creating parents.
    pub fn write(&self, relative: &str, contents: &str) -> Result<()> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, relative: &str) -> Result<String> {
        let path = self.path().join(relative);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path().join(relative).exists()
    }

    /// Workspace over this repository using git's ignore rules.
    pub fn workspace(&self) -> Result<Workspace> {
        Workspace::new(self.path(), Arc::new(Git::new(self.path())))
    }
}

/// Model service that replays scripted invocation batches.
///
/// Responses are served in order; once exhausted, the `repeat` batch (or an
/// empty batch) is returned. The forced commit request is answered with the
/// `final` batch when one is set.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: VecDeque<Vec<Invocation>>,
    repeat: Vec<Invocation>,
    final_response: Option<Vec<Invocation>>,
    failure: Option<String>,
    sent: Vec<ModelMessage>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Vec<Invocation>>) -> Self {
        Self {
            responses: responses.into(),
            ..Self::default()
        }
    }

    /// Serve `responses`, then `repeat` forever.
    pub fn repeating(responses: Vec<Vec<Invocation>>, repeat: Vec<Invocation>) -> Self {
        Self {
            repeat,
            ..Self::new(responses)
        }
    }

    /// Model whose every request fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Answer the forced commit request with `response`.
    pub fn then_final(mut self, response: Vec<Invocation>) -> Self {
        self.final_response = Some(response);
        self
    }

    /// Every message received, in order.
    pub fn sent(&self) -> &[ModelMessage] {
        &self.sent
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn send(&mut self, message: ModelMessage) -> Result<Vec<Invocation>> {
        let forced = matches!(&message, ModelMessage::Text(text) if text == FORCE_COMMIT_PROMPT);
        self.sent.push(message);
        if let Some(failure) = &self.failure {
            return Err(anyhow!(failure.clone()));
        }
        if forced && let Some(response) = &self.final_response {
            return Ok(response.clone());
        }
        Ok(self
            .responses
            .pop_front()
            .unwrap_or_else(|| self.repeat.clone()))
    }
}
