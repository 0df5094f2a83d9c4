//! Orchestration for a single agent cycle.
//!
//! The loop sends the merged backlog to the model service, dispatches every
//! proposed capability invocation, feeds the results back and repeats until
//! the model commits, goes idle, or the call budget runs out.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::capability::Capability;
use crate::core::types::{Invocation, InvocationResult};
use crate::io::backlog::TaskBacklog;
use crate::io::config::AgentConfig;
use crate::io::git::Git;
use crate::io::model::{ModelMessage, ModelService};
use crate::io::prompt::PromptEngine;
use crate::io::workspace::Workspace;

/// Default number of model requests before the forced commit request.
pub const DEFAULT_MAX_CALLS: u32 = 15;

/// Text of the final request issued when the budget runs out.
pub const FORCE_COMMIT_PROMPT: &str =
    "Use the 'commit' function to generate a commit message for the changes made.";

/// Configuration for one loop run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum model requests before the forced commit request.
    pub max_calls: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_calls: DEFAULT_MAX_CALLS,
        }
    }
}

/// Reason why `run_agent` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// A batch contained a `commit` invocation with a non-empty message.
    Committed,
    /// The model returned no invocations.
    ModelIdle,
    /// The call budget ran out; the forced commit request was issued.
    BudgetExhausted,
}

/// Summary of a loop run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutcome {
    /// Final commit message; empty when the model never committed.
    pub commit_message: String,
    /// Total requests sent to the model service (forced request included).
    pub requests: u32,
    pub stop: LoopStop,
}

impl AgentOutcome {
    pub fn committed(&self) -> bool {
        !self.commit_message.is_empty()
    }
}

/// One dispatched invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: InvocationResult,
    /// Set for a `commit` invocation carrying a non-empty message.
    pub commit_message: Option<String>,
}

/// Routes parsed capabilities to the workspace bridge and the backlog store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    workspace: Workspace,
    backlog: TaskBacklog,
}

impl Dispatcher {
    pub fn new(workspace: Workspace, backlog: TaskBacklog) -> Self {
        Self { workspace, backlog }
    }

    /// Build a dispatcher for `root`, filtering with the repository's ignore rules.
    pub fn for_root(root: &Path, config: &AgentConfig) -> Result<Self> {
        let workspace = Workspace::new(root, Arc::new(Git::new(root)))?;
        let backlog = backlog_for_root(workspace.root(), config);
        Ok(Self::new(workspace, backlog))
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn backlog(&self) -> &TaskBacklog {
        &self.backlog
    }

    /// Dispatch one invocation. Malformed invocations become failed results.
    #[instrument(skip_all, fields(capability = %invocation.name))]
    pub async fn dispatch(&self, invocation: &Invocation) -> Dispatched {
        let capability = match Capability::parse(invocation) {
            Ok(capability) => capability,
            Err(err) => {
                warn!(error = %err, "rejected invocation");
                return Dispatched {
                    result: InvocationResult::failure(&invocation.name, err),
                    commit_message: None,
                };
            }
        };

        let mut commit_message = None;
        let output: Value = match capability {
            Capability::ListFiles { path } => json!(self.workspace.list_entries(&path).await),
            Capability::ReadFiles { path } => json!(self.workspace.read_entries(&path).await),
            Capability::WriteFile { path, content } => {
                json!(self.workspace.write_entry(&path, &content).await)
            }
            Capability::DeleteFile { path } => json!(self.workspace.delete_entry(&path).await),
            Capability::UpdateTasks { tasks } => json!(self.backlog.update(&tasks).await),
            Capability::Commit { message } => {
                if message.is_empty() {
                    warn!("commit with empty message ignored");
                } else {
                    commit_message = Some(message.clone());
                }
                json!(message)
            }
        };
        debug!("dispatched");
        Dispatched {
            result: InvocationResult::success(&invocation.name, output),
            commit_message,
        }
    }

    /// Dispatch a batch concurrently; results keep invocation order.
    pub async fn dispatch_batch(&self, invocations: &[Invocation]) -> Vec<Dispatched> {
        join_all(invocations.iter().map(|invocation| self.dispatch(invocation))).await
    }
}

/// Loop states.
enum State {
    AwaitingResponse(ModelMessage),
    Dispatching(Vec<Invocation>),
    Terminated(LoopStop),
}

/// Run the orchestration loop from the initial `prompt`.
///
/// Only model-service failures are returned as errors; capability failures are
/// reported back to the model as results.
#[instrument(skip_all, fields(max_calls = config.max_calls))]
pub async fn run_agent<M: ModelService>(
    model: &mut M,
    dispatcher: &Dispatcher,
    prompt: String,
    config: &LoopConfig,
) -> Result<AgentOutcome> {
    let mut requests = 0u32;
    // A commit only counts if nothing follows it: every new batch re-arms this.
    let mut commit_message: Option<String> = None;
    let mut state = State::AwaitingResponse(ModelMessage::Text(prompt));

    let stop = loop {
        state = match state {
            State::AwaitingResponse(_) if requests >= config.max_calls => {
                State::Terminated(LoopStop::BudgetExhausted)
            }
            State::AwaitingResponse(message) => {
                requests += 1;
                let invocations = model
                    .send(message)
                    .await
                    .with_context(|| format!("model request {requests}"))?;
                if invocations.is_empty() {
                    info!(requests, "model returned no invocations");
                    State::Terminated(LoopStop::ModelIdle)
                } else {
                    State::Dispatching(invocations)
                }
            }
            State::Dispatching(invocations) => {
                commit_message = None;
                let names: Vec<&str> = invocations.iter().map(|inv| inv.name.as_str()).collect();
                info!(requests, ?names, "dispatching batch");

                let mut results = Vec::with_capacity(invocations.len());
                for dispatched in dispatcher.dispatch_batch(&invocations).await {
                    if dispatched.commit_message.is_some() {
                        commit_message = dispatched.commit_message;
                    }
                    results.push(dispatched.result);
                }

                if commit_message.is_some() {
                    State::Terminated(LoopStop::Committed)
                } else {
                    State::AwaitingResponse(ModelMessage::Results(results))
                }
            }
            State::Terminated(stop) => break stop,
        };
    };

    if stop == LoopStop::BudgetExhausted {
        warn!(requests, "call budget exhausted, forcing commit");
        requests += 1;
        let invocations = model
            .send(ModelMessage::Text(FORCE_COMMIT_PROMPT.to_string()))
            .await
            .context("forced commit request")?;
        commit_message = invocations.first().and_then(forced_message);
    }

    let commit_message = commit_message.unwrap_or_default();
    info!(requests, ?stop, committed = !commit_message.is_empty(), "agent loop finished");
    Ok(AgentOutcome {
        commit_message,
        requests,
        stop,
    })
}

fn forced_message(invocation: &Invocation) -> Option<String> {
    invocation
        .arguments
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Backlog store for `root` using the configured (root-relative) paths.
pub fn backlog_for_root(root: &Path, config: &AgentConfig) -> TaskBacklog {
    TaskBacklog::new(
        root.join(&config.tasks.ai_path),
        root.join(&config.tasks.user_path),
    )
}

/// Render the initial prompt from the backlog under `root`.
pub async fn load_task_prompt(root: &Path, config: &AgentConfig) -> Result<String> {
    let backlog = backlog_for_root(root, config)
        .read()
        .await
        .context("read task backlog")?;
    PromptEngine::new()?.render_tasks(&backlog)
}

/// Run one full cycle for the project at `root`: read the backlog, run the loop.
pub async fn run_cycle<M: ModelService>(
    root: &Path,
    config: &AgentConfig,
    model: &mut M,
) -> Result<AgentOutcome> {
    let dispatcher = Dispatcher::for_root(root, config)?;
    let prompt = load_task_prompt(dispatcher.workspace().root(), config).await?;
    run_agent(
        model,
        &dispatcher,
        prompt,
        &LoopConfig {
            max_calls: config.max_calls,
        },
    )
    .await
}
