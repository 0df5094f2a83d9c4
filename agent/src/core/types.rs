//! Shared deterministic types for the agent core.
//!
//! These types define stable contracts between the controller, the model
//! service and the workspace adapters. They carry no I/O.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// The two task backlog slots merged into the initial prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlog {
    /// Tasks maintained by the agent itself.
    pub ai: String,
    /// Tasks written by a human operator; cleared after every update.
    pub user: String,
}

/// A workspace file and its text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root, `/`-separated.
    pub path: String,
    pub content: String,
}

/// Result of a two-phase (copy, then delete) move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Destination written and source removed.
    Moved,
    /// Nothing was copied; the source is untouched.
    NotCopied,
    /// Destination written but the source could not be removed: both copies exist.
    CopiedNotDeleted,
}

/// One capability invocation proposed by the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub name: String,
    /// Named arguments; an object for well-formed invocations.
    #[serde(default)]
    pub arguments: Value,
}

impl Invocation {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Result of one dispatched invocation, keyed by capability name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub name: String,
    /// `{"output": ...}` on success, `{"error": "..."}` on failure.
    pub response: Value,
}

impl InvocationResult {
    pub fn success(name: impl Into<String>, output: Value) -> Self {
        Self {
            name: name.into(),
            response: json!({ "output": output }),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            name: name.into(),
            response: json!({ "error": error.to_string() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }

    pub fn output(&self) -> Option<&Value> {
        self.response.get("output")
    }
}
