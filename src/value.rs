// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replicated state tree.
//!
//! [`StateValue`] is a JSON value whose containers live behind [`Arc`]. Two
//! snapshots can therefore share any subtree that did not change, and
//! consumers can use [`StateValue::is_same_node`] as a cheap "did this part
//! of the state change" check instead of a deep comparison.
//!
//! # Structural Sharing
//!
//! ```text
//!   old root ──┬── a ──┬── b (shared)
//!              │       └── d: 5
//!              └── x (shared)
//!
//!   new root ──┬── a' ─┬── b (shared)
//!              │       └── d: 6
//!              └── x (shared)
//! ```
//!
//! Cloning a `StateValue` only bumps reference counts. Mutation goes through
//! copy-on-write (`Arc::make_mut`), so a published snapshot is never changed
//! in place.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Object node contents.
pub type ObjectMap = BTreeMap<String, StateValue>;

/// A node of the replicated state tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Arc<Vec<StateValue>>),
    Object(Arc<ObjectMap>),
}

/// Which kind of JSON value a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl StateValue {
    /// Build an empty object node.
    pub fn object() -> Self {
        StateValue::Object(Arc::new(ObjectMap::new()))
    }

    /// Build an empty array node.
    pub fn array() -> Self {
        StateValue::Array(Arc::new(Vec::new()))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            StateValue::Null => ValueKind::Null,
            StateValue::Bool(_) => ValueKind::Bool,
            StateValue::Number(_) => ValueKind::Number,
            StateValue::String(_) => ValueKind::String,
            StateValue::Array(_) => ValueKind::Array,
            StateValue::Object(_) => ValueKind::Object,
        }
    }

    /// Arrays and objects are containers; everything else is a leaf.
    pub fn is_container(&self) -> bool {
        matches!(self, StateValue::Array(_) | StateValue::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectMap> {
        match self {
            StateValue::Object(map) => Some(&**map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[StateValue]> {
        match self {
            StateValue::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Reference identity.
    ///
    /// Containers are the same node iff they point at the same allocation.
    /// Leaves have no identity of their own and compare by value.
    pub fn is_same_node(&self, other: &StateValue) -> bool {
        match (self, other) {
            (StateValue::Array(a), StateValue::Array(b)) => Arc::ptr_eq(a, b),
            (StateValue::Object(a), StateValue::Object(b)) => Arc::ptr_eq(a, b),
            (a, b) if !a.is_container() && !b.is_container() => a == b,
            _ => false,
        }
    }

    /// Copy the top level of a container into a fresh allocation.
    ///
    /// Children are carried over by reference, so the result is deeply equal
    /// to `self` but not the same node.
    pub fn shallow_clone(&self) -> StateValue {
        match self {
            StateValue::Array(items) => StateValue::Array(Arc::new((**items).clone())),
            StateValue::Object(map) => StateValue::Object(Arc::new((**map).clone())),
            leaf => leaf.clone(),
        }
    }

    /// Look up a direct child by pointer segment.
    ///
    /// Objects are indexed by key, arrays by a decimal index.
    pub fn get(&self, segment: &str) -> Option<&StateValue> {
        match self {
            StateValue::Object(map) => map.get(segment),
            StateValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Mutable child lookup, copying the container first if it is shared.
    pub(crate) fn get_mut(&mut self, segment: &str) -> Option<&mut StateValue> {
        match self {
            StateValue::Object(map) => Arc::make_mut(map).get_mut(segment),
            StateValue::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                Arc::make_mut(items).get_mut(index)
            }
            _ => None,
        }
    }

    /// Follow a list of segments from this node.
    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&StateValue> {
        path.iter()
            .try_fold(self, |node, segment| node.get(segment.as_ref()))
    }

    /// Follow an RFC 6901 pointer (`""` is the node itself).
    pub fn pointer(&self, pointer: &str) -> Option<&StateValue> {
        self.get_path(&crate::patch::pointer_segments(pointer))
    }

    /// Write `value` at `pointer`, replacing an existing slot or adding a new one.
    ///
    /// Copy-on-write: containers shared with other snapshots are copied along
    /// the path, everything else stays shared.
    pub fn set_pointer(&mut self, pointer: &str, value: impl Into<StateValue>) -> crate::error::Result<()> {
        let op = if self.pointer(pointer).is_some() {
            crate::patch::PatchOp::replace(pointer, value.into())
        } else {
            crate::patch::PatchOp::add(pointer, value.into())
        };
        crate::patch::apply_op(self, &op)
    }

    /// Remove the slot at `pointer` (copy-on-write).
    pub fn remove_pointer(&mut self, pointer: &str) -> crate::error::Result<()> {
        crate::patch::apply_op(self, &crate::patch::PatchOp::remove(pointer))
    }

    /// Convert into a plain `serde_json::Value` (deep copy).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self)
    }
}

impl From<serde_json::Value> for StateValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StateValue::Null,
            serde_json::Value::Bool(b) => StateValue::Bool(b),
            serde_json::Value::Number(n) => StateValue::Number(n),
            serde_json::Value::String(s) => StateValue::String(s),
            serde_json::Value::Array(items) => {
                StateValue::Array(Arc::new(items.into_iter().map(StateValue::from).collect()))
            }
            serde_json::Value::Object(map) => StateValue::Object(Arc::new(
                map.into_iter().map(|(k, v)| (k, StateValue::from(v))).collect(),
            )),
        }
    }
}

impl From<&StateValue> for serde_json::Value {
    fn from(value: &StateValue) -> Self {
        match value {
            StateValue::Null => serde_json::Value::Null,
            StateValue::Bool(b) => serde_json::Value::Bool(*b),
            StateValue::Number(n) => serde_json::Value::Number(n.clone()),
            StateValue::String(s) => serde_json::Value::String(s.clone()),
            StateValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            StateValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        StateValue::Bool(b)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        StateValue::Number(n.into())
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::String(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::String(s)
    }
}

impl FromIterator<(String, StateValue)> for StateValue {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        StateValue::Object(Arc::new(iter.into_iter().collect()))
    }
}

impl FromIterator<StateValue> for StateValue {
    fn from_iter<I: IntoIterator<Item = StateValue>>(iter: I) -> Self {
        StateValue::Array(Arc::new(iter.into_iter().collect()))
    }
}

impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StateValue::Null => serializer.serialize_unit(),
            StateValue::Bool(b) => serializer.serialize_bool(*b),
            StateValue::Number(n) => n.serialize(serializer),
            StateValue::String(s) => serializer.serialize_str(s),
            StateValue::Array(items) => items.as_slice().serialize(serializer),
            StateValue::Object(map) => (**map).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(StateValue::from)
    }
}
