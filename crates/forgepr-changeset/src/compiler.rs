// compiler.rs — Merge caller intent against the files currently on a branch.
//
// compile() is a pure function: it reads the baseline produced by the Tree
// Reader, resolves every ChangeRequest (invoking resolvers synchronously),
// and emits one Action per changeset entry in insertion order. No I/O
// happens here; providers only ever see the resulting action list.
//
// Path convention: `existing` and the changeset are both keyed by
// scope-relative paths, so the existence check a resolver sees is scoped the
// same way the write will be. Emitted action paths carry the scope prefix.

use std::collections::BTreeMap;

use crate::action::Action;
use crate::changeset::{ChangeSet, FileState};
use crate::scope;

/// Compile a changeset into a normalized action list.
///
/// - literal content → Create (path absent) or Update (path present)
/// - resolver → invoked with `{exists, path, contents}`; `contents` is `""`
///   for absent files; the result is treated exactly like a literal
/// - delete / resolver returning `None` → Delete, even when the path is
///   absent (the commit transaction treats that as a no-op)
pub fn compile(
    existing: &BTreeMap<String, String>,
    changes: &ChangeSet,
    scope_path: Option<&str>,
) -> Vec<Action> {
    let scope_path = scope::normalize_scope(scope_path);

    changes
        .iter()
        .map(|(path, request)| {
            let current = existing.get(path);
            let state = FileState {
                exists: current.is_some(),
                path: path.to_string(),
                contents: current.cloned().unwrap_or_default(),
            };
            let full_path = scope::join(scope_path.as_deref(), path);

            match request.resolve(&state) {
                None => Action::delete(full_path),
                Some(content) if state.exists => Action::update(full_path, content),
                Some(content) => Action::create(full_path, content),
            }
        })
        .inspect(|action| tracing::debug!("compiled {} {}", action.kind, action.path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::changeset::ChangeRequest;
    use std::sync::{Arc, Mutex};

    fn existing(files: &[(&str, &str)]) -> BTreeMap<String, String> {
        files
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn literal_on_empty_tree_creates() {
        let changes = ChangeSet::try_from_iter([("a.txt", "hello")]).unwrap();
        let actions = compile(&BTreeMap::new(), &changes, None);
        assert_eq!(actions, vec![Action::create("a.txt", "hello")]);
    }

    #[test]
    fn resolver_sees_existing_contents_and_updates() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in = Arc::clone(&seen);
        let mut changes = ChangeSet::new();
        changes
            .insert(
                "cfg.json",
                ChangeRequest::resolver(move |f| {
                    *seen_in.lock().unwrap() = Some(f.clone());
                    Some(format!("{}-v2", f.contents))
                }),
            )
            .unwrap();

        let actions = compile(&existing(&[("cfg.json", "v1")]), &changes, None);

        let state = seen.lock().unwrap().clone().unwrap();
        assert!(state.exists);
        assert_eq!(state.contents, "v1");
        assert_eq!(actions, vec![Action::update("cfg.json", "v1-v2")]);
    }

    #[test]
    fn resolver_on_absent_file_gets_empty_contents() {
        let mut changes = ChangeSet::new();
        changes
            .insert(
                "new.txt",
                ChangeRequest::resolver(|f| {
                    assert!(!f.exists);
                    assert_eq!(f.contents, "");
                    Some("fresh".to_string())
                }),
            )
            .unwrap();

        let actions = compile(&BTreeMap::new(), &changes, None);
        assert_eq!(actions[0].kind, ActionKind::Create);
    }

    #[test]
    fn resolver_returning_none_deletes() {
        let mut changes = ChangeSet::new();
        changes
            .insert("gone.txt", ChangeRequest::resolver(|_| None))
            .unwrap();
        let actions = compile(&existing(&[("gone.txt", "x")]), &changes, None);
        assert_eq!(actions, vec![Action::delete("gone.txt")]);
    }

    #[test]
    fn delete_of_present_and_absent_paths_pass_through() {
        let changes = ChangeSet::try_from_iter([
            ("old.txt", ChangeRequest::Delete),
            ("never.txt", ChangeRequest::Delete),
        ])
        .unwrap();
        let actions = compile(&existing(&[("old.txt", "bye")]), &changes, None);
        assert_eq!(
            actions,
            vec![Action::delete("old.txt"), Action::delete("never.txt")]
        );
    }

    #[test]
    fn scope_prefixes_paths_and_scopes_existence() {
        let mut changes = ChangeSet::new();
        changes
            .insert(
                "app.yaml",
                ChangeRequest::resolver(|f| {
                    assert_eq!(f.path, "app.yaml");
                    assert!(f.exists);
                    Some(f.contents.to_uppercase())
                }),
            )
            .unwrap();
        changes.insert("extra.yaml", "x").unwrap();

        let actions = compile(
            &existing(&[("app.yaml", "replicas: 1")]),
            &changes,
            Some("/deploy/"),
        );
        assert_eq!(
            actions,
            vec![
                Action::update("deploy/app.yaml", "REPLICAS: 1"),
                Action::create("deploy/extra.yaml", "x"),
            ]
        );
    }

    #[test]
    fn action_order_follows_insertion_order() {
        let changes =
            ChangeSet::try_from_iter([("z.txt", "1"), ("a.txt", "2"), ("m.txt", "3")]).unwrap();
        let actions = compile(&BTreeMap::new(), &changes, None);
        let paths: Vec<_> = actions.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["z.txt", "a.txt", "m.txt"]);
    }
}
