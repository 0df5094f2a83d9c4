//! Stable exit codes for the agent CLI.

/// Command succeeded (for `run`: a commit message was produced).
pub const OK: i32 = 0;
/// Command failed: invalid config, unreadable backlog, or model service error.
pub const FAILED: i32 = 1;
/// `run` finished without a commit message.
pub const NO_COMMIT: i32 = 2;
