//! Lexical path helpers for keeping workspace operations under the project root.
//!
//! All comparisons are component-wise on normalized paths, so `/proj2` is never
//! mistaken for a descendant of `/proj`.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path escapes the project root: {path}")]
    EscapesRoot { path: String },
}

/// Normalize `path` lexically: drop `.` and fold `..` into its parent.
///
/// Leading `..` components of a relative path are kept; `..` at a filesystem
/// root is dropped.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a root-relative `requested` path, refusing anything outside `root`.
///
/// `root` is expected to be absolute and normalized. The root itself is
/// rejected as well: workspace operations address files, never the root.
pub fn resolve_within(root: &Path, requested: &str) -> Result<PathBuf, PathError> {
    if requested.trim().is_empty() {
        return Err(PathError::Empty);
    }
    let resolved = normalize(&root.join(requested));
    if !is_strict_ancestor(root, &resolved) {
        return Err(PathError::EscapesRoot {
            path: requested.to_string(),
        });
    }
    Ok(resolved)
}

/// True if `ancestor` is a proper ancestor of `path` (component-wise).
pub fn is_strict_ancestor(ancestor: &Path, path: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}

/// Render `path` relative to `root` with `/` separators.
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_display(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_parent_and_current_dirs() {
        assert_eq!(
            normalize(Path::new("/proj/a/./b/../c")),
            PathBuf::from("/proj/a/c")
        );
        assert_eq!(normalize(Path::new("../x/../y")), PathBuf::from("../y"));
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_a_descendant() {
        assert!(!is_strict_ancestor(
            Path::new("/proj"),
            Path::new("/proj2/file")
        ));
        assert!(is_strict_ancestor(Path::new("/proj"), Path::new("/proj/a")));
        assert!(!is_strict_ancestor(Path::new("/proj"), Path::new("/proj")));
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let root = Path::new("/proj");
        assert_eq!(
            resolve_within(root, "src/../lib.rs").expect("resolve"),
            PathBuf::from("/proj/lib.rs")
        );
        assert!(matches!(
            resolve_within(root, "../proj2/secret"),
            Err(PathError::EscapesRoot { .. })
        ));
        assert!(matches!(
            resolve_within(root, "/etc/passwd"),
            Err(PathError::EscapesRoot { .. })
        ));
        assert!(matches!(
            resolve_within(root, "."),
            Err(PathError::EscapesRoot { .. })
        ));
        assert_eq!(resolve_within(root, "  "), Err(PathError::Empty));
    }

    #[test]
    fn relative_display_uses_forward_slashes() {
        let root = Path::new("/proj");
        assert_eq!(
            relative_display(root, &root.join("a").join("b.txt")),
            Some("a/b.txt".to_string())
        );
        assert_eq!(relative_display(root, Path::new("/other/b.txt")), None);
        assert_eq!(relative_display(root, root), None);
    }
}
