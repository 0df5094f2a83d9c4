//! Agent configuration stored in `agent.toml` at the project root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config file name, relative to the project root.
pub const CONFIG_FILE: &str = "agent.toml";

/// Agent configuration (TOML).
///
/// Missing fields default to the values the agent shipped with, so an absent
/// file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum number of model requests before the forced commit request.
    pub max_calls: u32,

    pub tasks: TasksConfig,

    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TasksConfig {
    /// Agent-maintained backlog, relative to the project root.
    pub ai_path: PathBuf,
    /// Operator-maintained backlog, relative to the project root.
    pub user_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            ai_path: PathBuf::from(".ai-tasks.md"),
            user_path: PathBuf::from("tasks.md"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 5 * 60,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_calls: 15,
            tasks: TasksConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_calls == 0 {
            return Err(anyhow!("max_calls must be > 0"));
        }
        if self.tasks.ai_path.as_os_str().is_empty() {
            return Err(anyhow!("tasks.ai_path must not be empty"));
        }
        if self.tasks.user_path.as_os_str().is_empty() {
            return Err(anyhow!("tasks.user_path must not be empty"));
        }
        if self.tasks.ai_path == self.tasks.user_path {
            return Err(anyhow!("tasks.ai_path and tasks.user_path must differ"));
        }
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model.name must not be empty"));
        }
        if self.model.api_key_env.trim().is_empty() {
            return Err(anyhow!("model.api_key_env must not be empty"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.model.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("environment variable {} is not set", self.model.api_key_env))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Load `.env.local` from the project root into the process environment.
///
/// Variables already set in the environment win. A missing file is not an error.
pub fn load_env_file(root: &Path) -> Result<()> {
    let path = root.join(".env.local");
    if !path.exists() {
        return Ok(());
    }
    dotenvy::from_path(&path).with_context(|| format!("load {}", path.display()))?;
    debug!(path = %path.display(), "loaded environment file");
    Ok(())
}
