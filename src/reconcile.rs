// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Selective-clone reconciliation.
//!
//! Rebuilds the replica's mirror from the previous snapshot, the changed-path
//! set and the patch that origin published:
//!
//! 1. Shallow-clone the root.
//! 2. For every changed path, shortest first, shallow-clone the container at
//!    that path inside the (already fresh) parent.
//! 3. Apply the patch against the fresh nodes.
//!
//! Because paths arrive sorted by length, a parent's clone always exists
//! before a child slot inside it is overwritten. Anything the patch does not
//! touch keeps its previous allocation.

use crate::error::Result;
use crate::patch::{apply_op, PatchOp};
use crate::value::StateValue;

/// Replace the container at `path` with a shallow clone of itself.
///
/// Every ancestor of `path` must already be a fresh clone owned by `root`.
/// Targets that are missing or are leaves are left alone.
pub fn clone_path<S: AsRef<str>>(root: &mut StateValue, path: &[S]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut parent = root;
    for segment in parents {
        match parent.get_mut(segment.as_ref()) {
            Some(child) => parent = child,
            None => return,
        }
    }

    if let Some(target) = parent.get_mut(last.as_ref()) {
        if target.is_container() {
            *target = target.shallow_clone();
        }
    }
}

/// Produce the next snapshot from `current`.
///
/// `changed_paths` of `None` (or empty) means only the root is cloned.
/// `current` is never modified; on error it is still the valid snapshot.
pub fn reconcile<S: AsRef<str>>(
    current: &StateValue,
    changed_paths: Option<&[Vec<S>]>,
    patch: &[PatchOp],
) -> Result<StateValue> {
    let mut next = current.shallow_clone();

    for path in changed_paths.unwrap_or_default() {
        clone_path(&mut next, path);
    }

    for op in patch {
        apply_op(&mut next, op)?;
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changed_paths::changed_paths;
    use crate::patch::compare;
    use serde_json::json;

    fn state(value: serde_json::Value) -> StateValue {
        StateValue::from(value)
    }

    #[test]
    fn test_clone_path_object_target() {
        let orig = state(json!({"bar": {}, "foo": {"qux": 1}}));
        let mut next = orig.shallow_clone();
        clone_path(&mut next, &["foo"]);

        assert!(next.get("bar").unwrap().is_same_node(orig.get("bar").unwrap()));
        assert!(!next.get("foo").unwrap().is_same_node(orig.get("foo").unwrap()));
        assert_eq!(next.get("foo"), orig.get("foo"));
    }

    #[test]
    fn test_clone_path_array_target() {
        let orig = state(json!({"bar": {}, "foo": ["qux"]}));
        let mut next = orig.shallow_clone();
        clone_path(&mut next, &["foo"]);

        assert!(next.get("bar").unwrap().is_same_node(orig.get("bar").unwrap()));
        assert!(!next.get("foo").unwrap().is_same_node(orig.get("foo").unwrap()));
        assert_eq!(next.get("foo"), orig.get("foo"));
    }

    #[test]
    fn test_clone_path_skips_leaves_and_missing() {
        let orig = state(json!({"n": 1, "o": {"p": 2}}));
        let mut next = orig.shallow_clone();
        clone_path(&mut next, &["n"]);
        clone_path(&mut next, &["missing", "deeper"]);
        clone_path::<&str>(&mut next, &[]);
        assert_eq!(next, orig);
        assert!(next.get("o").unwrap().is_same_node(orig.get("o").unwrap()));
    }

    #[test]
    fn test_reconcile_scenario_shares_untouched_subtree() {
        let old = state(json!({"a": {"b": {"c": [1, 2, 3]}, "d": 5}}));
        let new = state(json!({"a": {"b": {"c": [1, 2, 3]}, "d": 6}}));
        let patch = compare(&old, &new);
        let paths = changed_paths(&patch);
        assert_eq!(paths, Some(vec![vec!["a".to_string()]]));

        let result = reconcile(&old, paths.as_deref(), &patch).unwrap();
        assert_eq!(result, new);
        assert!(!result.is_same_node(&old));
        assert!(!result.get("a").unwrap().is_same_node(old.get("a").unwrap()));
        assert!(result
            .pointer("/a/b")
            .unwrap()
            .is_same_node(old.pointer("/a/b").unwrap()));
        // the previous snapshot is intact
        assert_eq!(old.pointer("/a/d").and_then(StateValue::as_i64), Some(5));
    }

    #[test]
    fn test_reconcile_without_paths_clones_root_only() {
        let old = state(json!({"foo": 1, "keep": {"x": 1}}));
        let patch = vec![PatchOp::replace("/foo", 0i64.into())];
        let result = reconcile::<String>(&old, None, &patch).unwrap();
        assert_eq!(result.to_json(), json!({"foo": 0, "keep": {"x": 1}}));
        assert!(!result.is_same_node(&old));
        assert!(result.get("keep").unwrap().is_same_node(old.get("keep").unwrap()));
        assert_eq!(old.get("foo").and_then(StateValue::as_i64), Some(1));
    }

    #[test]
    fn test_reconcile_ancestor_gets_fresh_reference() {
        let old = state(json!({"a": {"b": {"c": {"d": 1}}, "e": {"f": 1}}}));
        let new = state(json!({"a": {"b": {"c": {"d": 2}}, "e": {"f": 1}}}));
        let patch = compare(&old, &new);
        let paths = changed_paths(&patch);
        let result = reconcile(&old, paths.as_deref(), &patch).unwrap();

        for pointer in ["", "/a", "/a/b", "/a/b/c"] {
            assert!(
                !result.pointer(pointer).unwrap().is_same_node(old.pointer(pointer).unwrap()),
                "expected fresh node at '{}'",
                pointer
            );
        }
        assert!(result
            .pointer("/a/e")
            .unwrap()
            .is_same_node(old.pointer("/a/e").unwrap()));
    }

    #[test]
    fn test_reconcile_error_leaves_input_intact() {
        let old = state(json!({"a": {"b": [1]}}));
        let before = old.to_json();
        let patch = vec![
            PatchOp::replace("/a/b/0", 5i64.into()),
            PatchOp::remove("/a/b/3"),
        ];
        let paths = changed_paths(&patch);
        assert!(reconcile(&old, paths.as_deref(), &patch).is_err());
        assert_eq!(old.to_json(), before);
    }
}
