// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Changed-path extraction.
//!
//! Turns a [`Patch`](crate::patch::Patch) into the set of container paths that
//! must be cloned for the reconciled snapshot to keep structural sharing.
//!
//! # Example
//!
//! ```text
//! patch:  replace /a/b/c/0
//!         add     /x/y
//!
//! paths:  [a]          <- length 1 first
//!         [x]
//!         [a, b]       <- then length 2
//!         [a, b, c]
//! ```
//!
//! The mutated slot itself is never listed: its *container* is what gets
//! cloned. The root is never listed either, since reconciliation always
//! clones it.

use crate::patch::{pointer_segments, PatchOp};
use std::collections::HashSet;

/// Container paths, root to node, shortest first.
pub type ChangedPaths = Vec<Vec<String>>;

/// Extract the ancestor closure of every edited slot in `patch`.
///
/// Returns `None` for an empty patch, or when every edit is a direct child
/// of the root (nothing below the root needs cloning).
pub fn changed_paths(patch: &[PatchOp]) -> Option<ChangedPaths> {
    if patch.is_empty() {
        return None;
    }

    let mut ancestors: HashSet<Vec<String>> = HashSet::new();
    for op in patch {
        let mut segments = pointer_segments(op.path());
        segments.pop();
        while !segments.is_empty() {
            if !ancestors.insert(segments.clone()) {
                // Every shorter prefix was registered along with this one.
                break;
            }
            segments.pop();
        }
    }

    if ancestors.is_empty() {
        return None;
    }

    let mut keyed: Vec<(String, Vec<String>)> = ancestors
        .into_iter()
        .map(|path| (path.join("/"), path))
        .collect();
    keyed.sort_by(|(a_key, a), (b_key, b)| {
        a.len()
            .cmp(&b.len())
            .then_with(|| a_key.cmp(b_key))
            .then_with(|| a.cmp(b))
    });

    Some(keyed.into_iter().map(|(_, path)| path).collect())
}
