// scope.rs — Scope-path handling shared by reads and writes.
//
// A scope narrows a reconcile to one subtree of the repository. Callers see
// paths relative to the scope; providers see full repository paths. The
// prefix is stripped on the way out of the Tree Reader and re-added by the
// compiler on the way in, so both sides must agree on the exact rules here.
//
// Examples (scope = "deploy"):
//   join   "app.yaml"             → "deploy/app.yaml"
//   strip  "deploy/app.yaml"      → Some("app.yaml")
//   strip  "deployment/app.yaml"  → None (prefix match is per segment)

use crate::error::ChangeSetError;

/// Normalize an optional scope path.
///
/// Leading/trailing slashes and `.` segments are dropped. An empty or
/// root-only scope becomes `None`.
pub fn normalize_scope(scope: Option<&str>) -> Option<String> {
    let scope = scope?;
    let joined = segments(scope).collect::<Vec<_>>().join("/");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Validate and normalize a caller-supplied change path.
///
/// Paths are case-sensitive and must stay inside their scope: absolute
/// paths and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String, ChangeSetError> {
    if path.starts_with('/') {
        return Err(ChangeSetError::AbsolutePath(path.to_string()));
    }
    if path.split('/').any(|seg| seg == "..") {
        return Err(ChangeSetError::PathTraversal(path.to_string()));
    }
    let joined = segments(path).collect::<Vec<_>>().join("/");
    if joined.is_empty() {
        return Err(ChangeSetError::EmptyPath);
    }
    Ok(joined)
}

/// Re-add the scope prefix to a scope-relative path.
pub fn join(scope: Option<&str>, path: &str) -> String {
    match scope {
        Some(scope) if !scope.is_empty() => format!("{}/{}", scope, path),
        _ => path.to_string(),
    }
}

/// Strip the scope prefix from a full repository path.
///
/// Returns `None` when the path is not inside the scope. The scope itself
/// (a directory) is never returned as a relative path.
pub fn strip<'a>(scope: Option<&str>, full_path: &'a str) -> Option<&'a str> {
    match scope {
        Some(scope) if !scope.is_empty() => full_path
            .strip_prefix(scope)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty()),
        _ => Some(full_path),
    }
}

/// True when a scope-relative path names a direct child of the scope.
pub fn is_direct_child(relative: &str) -> bool {
    !relative.contains('/')
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|seg| !seg.is_empty() && *seg != ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── normalize ─────────────────────────────────────────────

    #[test]
    fn scope_is_trimmed_and_collapsed() {
        assert_eq!(normalize_scope(Some("/deploy//prod/")), Some("deploy/prod".to_string()));
        assert_eq!(normalize_scope(Some("./deploy")), Some("deploy".to_string()));
    }

    #[test]
    fn empty_scope_is_root() {
        assert_eq!(normalize_scope(None), None);
        assert_eq!(normalize_scope(Some("")), None);
        assert_eq!(normalize_scope(Some("/")), None);
    }

    #[test]
    fn change_paths_reject_escape_and_absolute() {
        assert_eq!(
            normalize_path("../etc/passwd"),
            Err(ChangeSetError::PathTraversal("../etc/passwd".to_string()))
        );
        assert_eq!(
            normalize_path("/etc/passwd"),
            Err(ChangeSetError::AbsolutePath("/etc/passwd".to_string()))
        );
        assert_eq!(normalize_path("./"), Err(ChangeSetError::EmptyPath));
        assert_eq!(normalize_path("a//b.txt").unwrap(), "a/b.txt");
    }

    // ── join / strip ──────────────────────────────────────────

    #[test]
    fn join_adds_prefix_only_with_scope() {
        assert_eq!(join(Some("deploy"), "app.yaml"), "deploy/app.yaml");
        assert_eq!(join(None, "app.yaml"), "app.yaml");
    }

    #[test]
    fn strip_matches_whole_segments() {
        assert_eq!(strip(Some("deploy"), "deploy/app.yaml"), Some("app.yaml"));
        assert_eq!(strip(Some("deploy"), "deployment/app.yaml"), None);
        assert_eq!(strip(Some("deploy"), "deploy"), None);
        assert_eq!(strip(None, "a/b.txt"), Some("a/b.txt"));
    }

    #[test]
    fn direct_child_has_no_separator() {
        assert!(is_direct_child("a.txt"));
        assert!(!is_direct_child("nested/a.txt"));
    }
}
