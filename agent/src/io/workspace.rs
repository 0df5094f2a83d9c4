//! Workspace bridge: the agent's view of the project file tree.
//!
//! Paths handed in by the model are resolved relative to the project root and
//! must stay inside it. Files excluded by version-control ignore rules (and the
//! `.git` directory itself) are invisible to listing and reading.
//!
//! Every operation recovers from I/O failures locally: failures are logged and
//! reported as `false`, a partial result, or a typed [`MoveOutcome`].

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use tokio::fs;
use tracing::{debug, error, instrument, warn};

use crate::core::path::{PathError, is_strict_ancestor, normalize, relative_display, resolve_within};
use crate::core::types::{FileEntry, MoveOutcome};
use crate::io::git::IgnoreOracle;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// File operations rooted at a project directory.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    ignore: Arc<dyn IgnoreOracle>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// Create a workspace rooted at `root` (which must exist).
    pub fn new(root: &Path, ignore: Arc<dyn IgnoreOracle>) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("resolve project root {}", root.display()))?;
        Ok(Self { root, ignore })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a root-relative path, refusing paths outside the root.
    ///
    /// Besides the lexical check, the deepest existing ancestor is resolved
    /// through symlinks and must still lie inside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathError> {
        let resolved = resolve_within(&self.root, path)?;
        if !stays_within(&self.root, &resolved) {
            return Err(PathError::EscapesRoot {
                path: path.to_string(),
            });
        }
        Ok(resolved)
    }

    /// Expand `pattern` into the visible files it names.
    ///
    /// An existing directory expands to every file beneath it; anything else is
    /// treated as a glob relative to the root. Results are root-relative,
    /// sorted and free of duplicates.
    #[instrument(skip(self))]
    pub async fn list_entries(&self, pattern: &str) -> Vec<String> {
        let root = self.root.clone();
        let ignore = Arc::clone(&self.ignore);
        let pattern = pattern.to_string();
        let listed = tokio::task::spawn_blocking(move || {
            let candidates = expand_pattern(&root, &pattern);
            let ignored = ignore.ignored(&candidates);
            candidates
                .into_iter()
                .filter(|path| !ignored.contains(path))
                .collect::<Vec<_>>()
        })
        .await;
        match listed {
            Ok(paths) => {
                debug!(count = paths.len(), "listed entries");
                paths
            }
            Err(err) => {
                error!(error = %err, "listing task failed");
                Vec::new()
            }
        }
    }

    /// Read every visible file matched by `pattern` as text.
    ///
    /// Files that cannot be read (permissions, races, non-UTF-8 content) are
    /// skipped with a warning.
    #[instrument(skip(self))]
    pub async fn read_entries(&self, pattern: &str) -> Vec<FileEntry> {
        let mut entries = Vec::new();
        for path in self.list_entries(pattern).await {
            match fs::read_to_string(self.root.join(&path)).await {
                Ok(content) => entries.push(FileEntry { path, content }),
                Err(err) => warn!(path = %path, error = %err, "failed to read file, skipping"),
            }
        }
        entries
    }

    /// Write `content` to `path`, creating parent directories. Overwrites.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn write_entry(&self, path: &str, content: &str) -> bool {
        let full_path = match self.resolve(path) {
            Ok(full_path) => full_path,
            Err(err) => {
                error!(error = %err, "refusing to write");
                return false;
            }
        };
        match write_with_parents(&full_path, content).await {
            Ok(()) => true,
            Err(err) => {
                error!(path = %full_path.display(), error = %format!("{err:#}"), "failed to write file");
                false
            }
        }
    }

    /// Delete `path` (absence is not an error) and prune emptied parent directories.
    ///
    /// Pruning walks upward and stops at the first non-empty directory, the
    /// project root, or the first failure.
    #[instrument(skip(self))]
    pub async fn delete_entry(&self, path: &str) -> bool {
        let full_path = match self.resolve(path) {
            Ok(full_path) => full_path,
            Err(err) => {
                error!(error = %err, "refusing to delete");
                return false;
            }
        };
        match fs::remove_file(&full_path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %full_path.display(), "file already absent");
            }
            Err(err) => {
                error!(path = %full_path.display(), error = %err, "failed to delete file");
                return false;
            }
        }
        self.prune_empty_parents(&full_path).await;
        true
    }

    /// Move `src` to `dst` as copy-then-delete.
    ///
    /// A failed copy leaves the source untouched ([`MoveOutcome::NotCopied`]);
    /// a failed delete after a successful copy leaves both files in place
    /// ([`MoveOutcome::CopiedNotDeleted`]).
    #[instrument(skip(self))]
    pub async fn move_entry(&self, src: &str, dst: &str) -> MoveOutcome {
        let (from, to) = match (self.resolve(src), self.resolve(dst)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(err), _) | (_, Err(err)) => {
                error!(error = %err, "refusing to move");
                return MoveOutcome::NotCopied;
            }
        };
        if from == to {
            return MoveOutcome::Moved;
        }
        if let Err(err) = copy_with_parents(&from, &to).await {
            error!(
                from = %from.display(),
                to = %to.display(),
                error = %format!("{err:#}"),
                "failed to move file"
            );
            return MoveOutcome::NotCopied;
        }
        if !self.delete_entry(src).await {
            error!(from = %from.display(), "file copied but not deleted");
            return MoveOutcome::CopiedNotDeleted;
        }
        MoveOutcome::Moved
    }

    async fn prune_empty_parents(&self, file: &Path) {
        let mut current = file.parent().map(Path::to_path_buf);
        while let Some(dir) = current {
            if !is_strict_ancestor(&self.root, &dir) || !is_empty_dir(&dir).await {
                break;
            }
            if let Err(err) = fs::remove_dir(&dir).await {
                debug!(dir = %dir.display(), error = %err, "stopped pruning");
                break;
            }
            debug!(dir = %dir.display(), "pruned empty directory");
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}

async fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

async fn write_with_parents(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, content)
        .await
        .with_context(|| format!("write {}", path.display()))
}

async fn copy_with_parents(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(from, to)
        .await
        .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// True if `path`, with symlinks resolved as far as it exists, lies inside `root`.
///
/// `root` must be canonical. A dangling symlink anywhere on the way counts as
/// outside, since writing through it would create its target.
fn stays_within(root: &Path, path: &Path) -> bool {
    let mut existing = path;
    loop {
        match existing.canonicalize() {
            Ok(real) => return real == root || is_strict_ancestor(root, &real),
            Err(_) if existing.symlink_metadata().is_ok() => return false,
            Err(_) => match existing.parent() {
                Some(parent) => existing = parent,
                None => return false,
            },
        }
    }
}

/// Expand a directory or glob pattern into sorted root-relative file paths.
///
/// Paths outside the root and anything under `.git/` are dropped.
fn expand_pattern(root: &Path, pattern: &str) -> Vec<String> {
    let pattern = pattern.trim();
    let candidate = normalize(&root.join(pattern));
    let full_pattern = if candidate.is_dir() {
        format!("{}/**/*", Pattern::escape(&candidate.to_string_lossy()))
    } else {
        format!(
            "{}/{}",
            Pattern::escape(&root.to_string_lossy()),
            pattern.trim_start_matches("./")
        )
    };

    let paths = match glob::glob_with(&full_pattern, GLOB_OPTIONS) {
        Ok(paths) => paths,
        Err(err) => {
            warn!(pattern, error = %err, "invalid glob pattern");
            return Vec::new();
        }
    };

    let mut found = BTreeSet::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => normalize(&path),
            Err(err) => {
                warn!(error = %err, "skipping unreadable glob entry");
                continue;
            }
        };
        if !path.is_file() || !is_strict_ancestor(root, &path) || !stays_within(root, &path) {
            continue;
        }
        let Some(relative) = relative_display(root, &path) else {
            continue;
        };
        if relative.split('/').any(|part| part == ".git") {
            continue;
        }
        found.insert(relative);
    }
    found.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StaticIgnore, TestRepo};
    use std::fs as std_fs;

    fn workspace(root: &Path, ignored: &[&str]) -> Workspace {
        Workspace::new(root, Arc::new(StaticIgnore::new(ignored))).expect("workspace")
    }

    fn seed(root: &Path, files: &[(&str, &str)]) {
        for (path, content) in files {
            let full = root.join(path);
            std_fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
            std_fs::write(full, content).expect("write");
        }
    }

    #[tokio::test]
    async fn directory_pattern_expands_recursively() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(
            temp.path(),
            &[("src/a.rs", "a"), ("src/nested/b.rs", "b"), ("README.md", "r")],
        );
        let ws = workspace(temp.path(), &[]);

        assert_eq!(ws.list_entries("src").await, vec!["src/a.rs", "src/nested/b.rs"]);
        assert_eq!(ws.list_entries("src/").await, vec!["src/a.rs", "src/nested/b.rs"]);
        assert_eq!(
            ws.list_entries(".").await,
            vec!["README.md", "src/a.rs", "src/nested/b.rs"]
        );
    }

    #[tokio::test]
    async fn glob_star_does_not_cross_directories_and_skips_dotfiles() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(
            temp.path(),
            &[
                ("src/a.rs", "a"),
                ("src/nested/b.rs", "b"),
                (".hidden.rs", "h"),
                (".git/config", "c"),
            ],
        );
        let ws = workspace(temp.path(), &[]);

        assert_eq!(ws.list_entries("src/*.rs").await, vec!["src/a.rs"]);
        assert_eq!(
            ws.list_entries("**/*.rs").await,
            vec!["src/a.rs", "src/nested/b.rs"]
        );
        assert_eq!(ws.list_entries(".hidden.rs").await, vec![".hidden.rs"]);
        assert!(ws.list_entries(".git/config").await.is_empty());
    }

    #[tokio::test]
    async fn listing_never_escapes_the_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("proj/a.txt", "a"), ("proj2/secret.txt", "s")]);
        let ws = workspace(&temp.path().join("proj"), &[]);

        assert!(ws.list_entries("../proj2/*").await.is_empty());
        assert!(ws.list_entries("../proj2").await.is_empty());
        assert_eq!(ws.list_entries("*").await, vec!["a.txt"]);
    }

    #[tokio::test]
    async fn ignored_entries_are_invisible_to_list_and_read() {
        let repo = TestRepo::new().expect("repo");
        repo.write(".gitignore", ".env\ntarget/\n").expect("gitignore");
        repo.write(".env", "SECRET=1").expect("env");
        repo.write("target/debug/app", "bin").expect("target");
        repo.write("src/lib.rs", "pub fn lib() {}").expect("src");
        let ws = repo.workspace().expect("workspace");

        let listed = ws.list_entries(".").await;
        assert_eq!(listed, vec!["src/lib.rs"]);

        assert!(ws.read_entries(".env").await.is_empty());
        assert!(ws.read_entries("target").await.is_empty());
        assert!(ws.read_entries("target/debug/app").await.is_empty());

        let read = ws.read_entries("**/*").await;
        assert_eq!(
            read,
            vec![FileEntry {
                path: "src/lib.rs".to_string(),
                content: "pub fn lib() {}".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn read_skips_files_that_are_not_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("ok.txt", "fine")]);
        std_fs::write(temp.path().join("blob.bin"), [0xff_u8, 0xfe, 0x00, 0x80]).expect("blob");
        let ws = workspace(temp.path(), &[]);

        let read = ws.read_entries(".").await;
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].path, "ok.txt");
    }

    #[tokio::test]
    async fn write_creates_parents_and_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(temp.path(), &[]);

        assert!(ws.write_entry("deep/er/file.txt", "hello").await);
        assert!(ws.write_entry("deep/er/file.txt", "hello").await);
        assert_eq!(
            std_fs::read_to_string(temp.path().join("deep/er/file.txt")).expect("read"),
            "hello"
        );
    }

    #[tokio::test]
    async fn write_outside_root_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        std_fs::create_dir_all(temp.path().join("proj")).expect("proj");
        let ws = workspace(&temp.path().join("proj"), &[]);

        assert!(!ws.write_entry("../escape.txt", "x").await);
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn delete_prunes_emptied_directory_chain_but_not_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("a/b/c/file.txt", "x")]);
        let ws = workspace(temp.path(), &[]);

        assert!(ws.delete_entry("a/b/c/file.txt").await);
        assert!(!temp.path().join("a").exists());
        assert!(temp.path().exists());
    }

    #[tokio::test]
    async fn delete_with_siblings_removes_only_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("a/b/one.txt", "1"), ("a/b/two.txt", "2")]);
        let ws = workspace(temp.path(), &[]);

        assert!(ws.delete_entry("a/b/one.txt").await);
        assert!(!temp.path().join("a/b/one.txt").exists());
        assert!(temp.path().join("a/b/two.txt").exists());
    }

    #[tokio::test]
    async fn delete_stops_pruning_at_first_non_empty_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("a/keep.txt", "k"), ("a/b/c/file.txt", "x")]);
        let ws = workspace(temp.path(), &[]);

        assert!(ws.delete_entry("a/b/c/file.txt").await);
        assert!(!temp.path().join("a/b").exists());
        assert!(temp.path().join("a/keep.txt").exists());
    }

    #[tokio::test]
    async fn delete_missing_file_succeeds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ws = workspace(temp.path(), &[]);
        assert!(ws.delete_entry("never/existed.txt").await);
    }

    #[tokio::test]
    async fn move_relocates_file_and_prunes_source_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("old/place.txt", "data")]);
        let ws = workspace(temp.path(), &[]);

        assert_eq!(
            ws.move_entry("old/place.txt", "new/dir/place.txt").await,
            MoveOutcome::Moved
        );
        assert_eq!(
            std_fs::read_to_string(temp.path().join("new/dir/place.txt")).expect("read"),
            "data"
        );
        assert!(!temp.path().join("old").exists());
    }

    #[tokio::test]
    async fn move_with_uncreatable_destination_keeps_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("src.txt", "original"), ("blocker", "a file")]);
        let ws = workspace(temp.path(), &[]);

        assert_eq!(
            ws.move_entry("src.txt", "blocker/dst.txt").await,
            MoveOutcome::NotCopied
        );
        assert_eq!(
            std_fs::read_to_string(temp.path().join("src.txt")).expect("read"),
            "original"
        );
    }

    #[tokio::test]
    async fn move_onto_itself_is_a_no_op() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("same.txt", "keep")]);
        let ws = workspace(temp.path(), &[]);

        assert_eq!(ws.move_entry("same.txt", "./same.txt").await, MoveOutcome::Moved);
        assert_eq!(
            std_fs::read_to_string(temp.path().join("same.txt")).expect("read"),
            "keep"
        );
    }

    #[tokio::test]
    async fn dot_directory_is_listed_when_named() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(
            temp.path(),
            &[(".github/workflows/ci.yml", "on: push"), ("README.md", "r")],
        );
        let ws = workspace(temp.path(), &[]);

        assert_eq!(ws.list_entries(".").await, vec!["README.md"]);
        assert_eq!(
            ws.list_entries(".github/").await,
            vec![".github/workflows/ci.yml"]
        );
    }

    #[tokio::test]
    async fn ignored_non_ascii_file_stays_hidden() {
        let repo = TestRepo::new().expect("repo");
        repo.write(".gitignore", "*.secret\n").expect("gitignore");
        repo.write("naïve.secret", "TOKEN=1").expect("secret");
        repo.write("ok.txt", "ok").expect("ok");
        let ws = repo.workspace().expect("workspace");

        assert_eq!(ws.list_entries("*").await, vec!["ok.txt"]);
        assert!(ws.read_entries("naïve.secret").await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directory_does_not_disable_ignore_rules() {
        let repo = TestRepo::new().expect("repo");
        repo.write(".gitignore", "*.secret\n").expect("gitignore");
        repo.write("a.secret", "TOKEN=1").expect("secret");
        repo.write("real/x.txt", "x").expect("file");
        std::os::unix::fs::symlink(repo.path().join("real"), repo.path().join("linkdir"))
            .expect("symlink");
        let ws = repo.workspace().expect("workspace");

        assert_eq!(ws.list_entries("**/*").await, vec!["real/x.txt"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_pointing_outside_the_root_are_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("proj/a.txt", "a"), ("outside/secret.txt", "S")]);
        let proj = temp.path().join("proj");
        std::os::unix::fs::symlink(temp.path().join("outside"), proj.join("link"))
            .expect("dir symlink");
        std::os::unix::fs::symlink(temp.path().join("outside/secret.txt"), proj.join("alias.txt"))
            .expect("file symlink");
        std::os::unix::fs::symlink(temp.path().join("outside/new.txt"), proj.join("dangling.txt"))
            .expect("dangling symlink");
        let ws = workspace(&proj, &[]);

        assert!(ws.read_entries("link").await.is_empty());
        assert!(ws.read_entries("alias.txt").await.is_empty());
        assert_eq!(ws.list_entries(".").await, vec!["a.txt"]);

        assert!(!ws.write_entry("link/pwned.txt", "x").await);
        assert!(!ws.write_entry("dangling.txt", "x").await);
        assert!(!temp.path().join("outside/pwned.txt").exists());
        assert!(!temp.path().join("outside/new.txt").exists());

        assert!(!ws.delete_entry("link/secret.txt").await);
        assert!(temp.path().join("outside/secret.txt").exists());
        assert!(matches!(ws.resolve("link/secret.txt"), Err(PathError::EscapesRoot { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn move_reports_copy_left_behind_when_source_cannot_be_removed() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        seed(temp.path(), &[("locked/src.txt", "data")]);
        let locked = temp.path().join("locked");
        std_fs::set_permissions(&locked, std_fs::Permissions::from_mode(0o555)).expect("chmod");
        if std_fs::write(locked.join("write-check"), "").is_ok() {
            // Privileged users ignore directory permissions; nothing to observe.
            std_fs::set_permissions(&locked, std_fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }
        let ws = workspace(temp.path(), &[]);

        let outcome = ws.move_entry("locked/src.txt", "moved/src.txt").await;
        std_fs::set_permissions(&locked, std_fs::Permissions::from_mode(0o755)).expect("chmod");

        assert_eq!(outcome, MoveOutcome::CopiedNotDeleted);
        assert_eq!(
            std_fs::read_to_string(locked.join("src.txt")).expect("source"),
            "data"
        );
        assert_eq!(
            std_fs::read_to_string(temp.path().join("moved/src.txt")).expect("copy"),
            "data"
        );
    }
}
