// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value-level patches between two state snapshots.
//!
//! A [`Patch`] is an ordered list of RFC 6902 `add` / `replace` / `remove`
//! operations addressed with RFC 6901 pointers. Origin produces one with
//! [`compare`] after every action; replica applies it during reconciliation.
//!
//! The wire format, the diff, and pointer escaping come from `json-patch`
//! (and the `jsonptr` crate it is built on). Application stays here: it works
//! on [`StateValue`] so that untouched subtrees keep their allocation.
//!
//! # Diff Semantics
//!
//! - Deeply-equal inputs produce an empty patch.
//! - Top-level entries that are the same allocation on both sides are
//!   skipped without being serialized; the rest are diffed by `json-patch`.
//! - `json-patch` matches children by key or index only, so it cannot tell an
//!   object from an array holding the same entries. An entry in which a
//!   container changed kind is replaced whole.
//! - If the two roots are not containers of the same kind, a single `replace`
//!   of the whole document (pointer `""`) is emitted.
//! - Only `add`, `replace` and `remove` are produced, and never a `remove` of
//!   the root.

use crate::error::{ProtocolError, Result};
use crate::value::StateValue;
use json_patch::PatchOperation;
use jsonptr::{Pointer, PointerBuf, Token};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single field-level edit.
///
/// Decoding goes through [`PatchOperation`], so the pointer is validated and
/// `move` / `copy` / `test` are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase", try_from = "PatchOperation")]
pub enum PatchOp {
    Add { path: String, value: StateValue },
    Replace { path: String, value: StateValue },
    Remove { path: String },
}

/// Ordered list of edits turning one snapshot into the next.
pub type Patch = Vec<PatchOp>;

impl PatchOp {
    pub fn add(path: impl Into<String>, value: StateValue) -> Self {
        PatchOp::Add { path: path.into(), value }
    }

    pub fn replace(path: impl Into<String>, value: StateValue) -> Self {
        PatchOp::Replace { path: path.into(), value }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        PatchOp::Remove { path: path.into() }
    }

    /// The pointer this operation targets.
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Replace { path, .. } | PatchOp::Remove { path } => {
                path
            }
        }
    }

    /// Wire name of the operation (`add`, `replace`, `remove`).
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Remove { .. } => "remove",
        }
    }

    fn under(self, prefix: &str) -> Self {
        match self {
            PatchOp::Add { path, value } => PatchOp::Add { path: format!("{prefix}{path}"), value },
            PatchOp::Replace { path, value } => PatchOp::Replace { path: format!("{prefix}{path}"), value },
            PatchOp::Remove { path } => PatchOp::Remove { path: format!("{prefix}{path}") },
        }
    }
}

impl TryFrom<PatchOperation> for PatchOp {
    type Error = ProtocolError;

    fn try_from(op: PatchOperation) -> Result<Self> {
        match op {
            PatchOperation::Add(op) => Ok(PatchOp::add(op.path.as_str(), op.value.into())),
            PatchOperation::Replace(op) => Ok(PatchOp::replace(op.path.as_str(), op.value.into())),
            PatchOperation::Remove(op) => Ok(PatchOp::remove(op.path.as_str())),
            PatchOperation::Move(op) => Err(unsupported("move", &op.path)),
            PatchOperation::Copy(op) => Err(unsupported("copy", &op.path)),
            PatchOperation::Test(op) => Err(unsupported("test", &op.path)),
        }
    }
}

fn unsupported(name: &str, path: &PointerBuf) -> ProtocolError {
    ProtocolError::invalid_patch(path.as_str(), format!("unsupported operation '{name}'"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSON pointers
// ═══════════════════════════════════════════════════════════════════════════════

/// Escape a key for use inside a pointer (`~` → `~0`, `/` → `~1`).
pub fn escape_segment(segment: &str) -> String {
    Token::new(segment).encoded().to_owned()
}

/// Reverse of [`escape_segment`]. Invalid escapes are kept as written.
pub fn unescape_segment(segment: &str) -> String {
    match Token::from_encoded(segment) {
        Ok(token) => token.decoded().into_owned(),
        Err(_) => segment.to_owned(),
    }
}

/// Split a pointer into unescaped segments.
///
/// `""` (the whole document) yields no segments. A malformed pointer is
/// split leniently (anything before the first `/` is ignored), so this never
/// fails.
pub fn pointer_segments(pointer: &str) -> Vec<String> {
    match Pointer::parse(pointer) {
        Ok(parsed) => parsed.tokens().map(|token| token.decoded().into_owned()).collect(),
        Err(_) => pointer.split('/').skip(1).map(unescape_segment).collect(),
    }
}

/// Build a pointer from unescaped segments.
pub fn join_pointer<S: AsRef<str>>(segments: &[S]) -> String {
    PointerBuf::from_tokens(segments.iter().map(|s| Token::new(s.as_ref()))).to_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Diff
// ═══════════════════════════════════════════════════════════════════════════════

/// Compute the patch turning `old` into `new`.
pub fn compare(old: &StateValue, new: &StateValue) -> Patch {
    if old.is_same_node(new) {
        return Patch::new();
    }

    match (old, new) {
        (StateValue::Object(old_map), StateValue::Object(new_map)) => {
            let mut patch = Patch::new();
            for (key, old_value) in old_map.iter() {
                let pointer = join_pointer(&[key]);
                match new_map.get(key) {
                    Some(new_value) if old_value.is_same_node(new_value) => {}
                    Some(new_value) => patch.extend(diff_json(old_value, new_value, &pointer)),
                    None => patch.push(PatchOp::remove(pointer)),
                }
            }
            for (key, new_value) in new_map.iter() {
                if !old_map.contains_key(key) {
                    patch.push(PatchOp::add(join_pointer(&[key]), new_value.clone()));
                }
            }
            patch
        }
        _ => diff_json(old, new, ""),
    }
}

/// Diff two subtrees with `json-patch`, rooting the result at `prefix`.
fn diff_json(old: &StateValue, new: &StateValue, prefix: &str) -> Patch {
    if old == new {
        return Patch::new();
    }
    if !old.is_container() || !new.is_container() || !kinds_align(old, new) {
        return vec![PatchOp::replace(prefix, new.clone())];
    }
    json_patch::diff(&old.to_json(), &new.to_json())
        .0
        .into_iter()
        .filter_map(|op| PatchOp::try_from(op).ok())
        .map(|op| op.under(prefix))
        .collect()
}

/// Whether every position present on both sides holds either two containers
/// of the same kind or at least one scalar.
fn kinds_align(old: &StateValue, new: &StateValue) -> bool {
    if old.is_same_node(new) {
        return true;
    }
    match (old, new) {
        (StateValue::Object(a), StateValue::Object(b)) => a
            .iter()
            .all(|(key, child)| b.get(key).map_or(true, |other| kinds_align(child, other))),
        (StateValue::Array(a), StateValue::Array(b)) => {
            a.iter().zip(b.iter()).all(|(child, other)| kinds_align(child, other))
        }
        (StateValue::Object(_), StateValue::Array(_)) | (StateValue::Array(_), StateValue::Object(_)) => false,
        _ => true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Application
// ═══════════════════════════════════════════════════════════════════════════════

/// Apply one operation to `root` in place.
///
/// Containers along the way are obtained through copy-on-write, so a node
/// still referenced by another snapshot is copied rather than mutated.
pub fn apply_op(root: &mut StateValue, op: &PatchOp) -> Result<()> {
    let mut segments = pointer_segments(op.path());
    let Some(last) = segments.pop() else {
        return match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
                *root = value.clone();
                Ok(())
            }
            PatchOp::Remove { path } => Err(ProtocolError::invalid_patch(path, "cannot remove the document root")),
        };
    };

    let mut parent = root;
    for segment in &segments {
        parent = parent
            .get_mut(segment)
            .ok_or_else(|| ProtocolError::invalid_patch(op.path(), format!("missing parent segment '{segment}'")))?;
    }

    match parent {
        StateValue::Object(map) => {
            let map = Arc::make_mut(map);
            match op {
                PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
                    map.insert(last, value.clone());
                }
                PatchOp::Remove { .. } => {
                    if map.remove(&last).is_none() {
                        return Err(ProtocolError::invalid_patch(op.path(), "no such key"));
                    }
                }
            }
            Ok(())
        }
        StateValue::Array(items) => {
            let items = Arc::make_mut(items);
            match op {
                PatchOp::Add { value, .. } => {
                    let index = if last == "-" {
                        items.len()
                    } else {
                        parse_index(&last, op.path())?
                    };
                    if index > items.len() {
                        return Err(ProtocolError::invalid_patch(op.path(), "index out of bounds"));
                    }
                    items.insert(index, value.clone());
                }
                PatchOp::Replace { value, .. } => {
                    let index = parse_index(&last, op.path())?;
                    let slot = items
                        .get_mut(index)
                        .ok_or_else(|| ProtocolError::invalid_patch(op.path(), "index out of bounds"))?;
                    *slot = value.clone();
                }
                PatchOp::Remove { .. } => {
                    let index = parse_index(&last, op.path())?;
                    if index >= items.len() {
                        return Err(ProtocolError::invalid_patch(op.path(), "index out of bounds"));
                    }
                    items.remove(index);
                }
            }
            Ok(())
        }
        _ => Err(ProtocolError::invalid_patch(op.path(), "parent is not a container")),
    }
}

fn parse_index(segment: &str, path: &str) -> Result<usize> {
    segment
        .parse::<usize>()
        .map_err(|_| ProtocolError::invalid_patch(path, format!("'{segment}' is not an array index")))
}

/// Apply a whole patch, leaving `state` untouched.
///
/// Unchanged subtrees are shared with `state`; only containers on the path
/// to an edited slot are copied.
pub fn apply(state: &StateValue, patch: &[PatchOp]) -> Result<StateValue> {
    let mut next = state.clone();
    for op in patch {
        apply_op(&mut next, op)?;
    }
    Ok(next)
}
