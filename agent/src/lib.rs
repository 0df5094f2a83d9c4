//! Autonomous repository-editing agent.
//!
//! The agent reads a task backlog, hands it to a tool-calling model and lets
//! the model work through a fixed set of capabilities (list/read/write/delete
//! files, rewrite the backlog, commit) until it commits or its call budget runs
//! out. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (capability catalogue, argument
//!   parsing, path normalization). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (filesystem, git, model service).
//!   Isolated behind small types and traits so tests can substitute them.
//!
//! [`agent`] coordinates the two into the orchestration loop.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
