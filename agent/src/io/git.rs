//! Git adapter for the agent.
//!
//! The agent never commits by itself; git is only consulted as an oracle for
//! ignore rules, so the wrapper stays a small, explicit set of `git` calls.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Maximum paths passed to a single `git check-ignore` invocation.
const CHECK_IGNORE_CHUNK: usize = 256;

/// Answers "is this path ignored by version control?".
pub trait IgnoreOracle: Send + Sync {
    /// Return the subset of `paths` (root-relative, `/`-separated) that are ignored.
    ///
    /// Must not fail. Outside a repository (or without git) nothing is ignored.
    fn ignored(&self, paths: &[String]) -> HashSet<String>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Initialize a repository in the working directory.
    pub fn init(&self) -> Result<()> {
        self.run_checked(&["init", "--quiet"])?;
        Ok(())
    }

    /// Fail unless the working directory is inside a git work tree.
    fn ensure_work_tree(&self) -> Result<()> {
        let output = self.run_checked(&["rev-parse", "--is-inside-work-tree"])?;
        if String::from_utf8_lossy(&output.stdout).trim() != "true" {
            return Err(anyhow!(
                "{} is not inside a git work tree",
                self.workdir.display()
            ));
        }
        Ok(())
    }

    /// Run `git check-ignore` over `paths`, returning those that are ignored.
    ///
    /// When git rejects a whole batch (a path beyond a symlink or inside a
    /// submodule aborts the command), the batch is retried one path at a time
    /// and every path git still cannot classify is reported as ignored.
    #[instrument(skip_all, fields(count = paths.len()))]
    pub fn check_ignore(&self, paths: &[String]) -> Result<HashSet<String>> {
        self.ensure_work_tree()?;
        let mut ignored = HashSet::new();
        for chunk in paths.chunks(CHECK_IGNORE_CHUNK) {
            if let Some(found) = self.check_ignore_batch(chunk)? {
                ignored.extend(found);
                continue;
            }
            warn!(count = chunk.len(), "git check-ignore rejected batch, retrying per path");
            for path in chunk {
                match self.check_ignore_batch(std::slice::from_ref(path))? {
                    Some(found) => ignored.extend(found),
                    None => {
                        warn!(path = %path, "git cannot classify path, hiding it");
                        ignored.insert(path.clone());
                    }
                }
            }
        }
        debug!(ignored = ignored.len(), "checked ignore rules");
        Ok(ignored)
    }

    /// One `git check-ignore -z` call. `None` when git exits fatally.
    fn check_ignore_batch(&self, paths: &[String]) -> Result<Option<HashSet<String>>> {
        let mut args = vec!["check-ignore", "-z", "--"];
        args.extend(paths.iter().map(String::as_str));
        let output = self.run(&args)?;
        // Exit 1 means none of the paths are ignored.
        match output.status.code() {
            Some(0) | Some(1) => {}
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                debug!(?code, stderr = %stderr.trim(), "git check-ignore failed");
                return Ok(None);
            }
        }
        // `-z` prints paths verbatim (no C-quoting), NUL-terminated.
        let found = output
            .stdout
            .split(|byte| *byte == 0)
            .filter(|path| !path.is_empty())
            .map(|path| String::from_utf8_lossy(path).into_owned())
            .collect();
        Ok(Some(found))
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl IgnoreOracle for Git {
    fn ignored(&self, paths: &[String]) -> HashSet<String> {
        if paths.is_empty() {
            return HashSet::new();
        }
        match self.check_ignore(paths) {
            Ok(ignored) => ignored,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "ignore rules unavailable, treating all paths as visible");
                HashSet::new()
            }
        }
    }
}
