//! I/O adapters for the agent: configuration, git, files, backlog and model.

pub mod backlog;
pub mod config;
pub mod gemini;
pub mod git;
pub mod model;
pub mod prompt;
pub mod workspace;
