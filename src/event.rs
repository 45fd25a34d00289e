// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Protocol events exchanged between origin and replica.
//!
//! Every message on the channel is a JSON object discriminated by its `type`
//! field. Messages whose `type` is not one of ours belong to somebody else
//! sharing the channel and are ignored.
//!
//! # Wire Format
//!
//! | Event | `type` | Direction | Payload |
//! |-------|--------|-----------|---------|
//! | `Ready` | `replica:ready` | replica → origin | none |
//! | `InitialStateRequest` | `replica:rq-initial-state` | replica → origin | none |
//! | `InitialState` | `replica:initial-state` | either | `state` |
//! | `ActionDispatched` | `replica:dispatched` | replica → origin | `action` |
//! | `ActionProcessed` | `replica:action-processed` | origin → replica | `action`, `changedPaths`, `patch` |
//!
//! An `ActionProcessed` whose `changedPaths` is `null` (or missing) is a
//! no-op: the reducer returned a deeply-equal state.
//!
//! ```json
//! {"type":"replica:action-processed","action":{"type":"inc"},
//!  "changedPaths":[["a"]],"patch":[{"op":"replace","path":"/a/d","value":6}]}
//! ```

use crate::changed_paths::ChangedPaths;
use crate::error::{ProtocolError, Result};
use crate::patch::{Patch, PatchOp};
use crate::value::StateValue;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant of a [`ProtocolEvent`], recognizable without decoding the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    InitialStateRequest,
    InitialState,
    ActionDispatched,
    ActionProcessed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Ready,
        EventKind::InitialStateRequest,
        EventKind::InitialState,
        EventKind::ActionDispatched,
        EventKind::ActionProcessed,
    ];

    /// Wire value of the `type` field.
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Ready => "replica:ready",
            EventKind::InitialStateRequest => "replica:rq-initial-state",
            EventKind::InitialState => "replica:initial-state",
            EventKind::ActionDispatched => "replica:dispatched",
            EventKind::ActionProcessed => "replica:action-processed",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Recognize a message by its `type` tag alone.
    ///
    /// Returns `None` for anything that is not an object with one of our tags.
    pub fn of(message: &Value) -> Option<Self> {
        message
            .get("type")
            .and_then(Value::as_str)
            .and_then(Self::from_tag)
    }

    /// Metric label.
    pub fn label(self) -> &'static str {
        match self {
            EventKind::Ready => "ready",
            EventKind::InitialStateRequest => "initial_state_request",
            EventKind::InitialState => "initial_state",
            EventKind::ActionDispatched => "action_dispatched",
            EventKind::ActionProcessed => "action_processed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A store action: a `type` tag plus arbitrary payload fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Add a payload field (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// Payload of `replica:action-processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionProcessed {
    pub action: Action,
    /// `None` serializes as `null` and marks a no-op.
    #[serde(rename = "changedPaths", default)]
    pub changed_paths: Option<ChangedPaths>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<Patch>,
}

impl ActionProcessed {
    /// The reducer returned a deeply-equal state.
    pub fn noop(action: Action) -> Self {
        Self {
            action,
            changed_paths: None,
            patch: None,
        }
    }

    pub fn with_changes(action: Action, changed_paths: ChangedPaths, patch: Patch) -> Self {
        Self {
            action,
            changed_paths: Some(changed_paths),
            patch: Some(patch),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.changed_paths.is_none()
    }

    /// Changed paths and patch, or `None` for a no-op.
    ///
    /// A missing patch alongside present paths reads as an empty patch.
    pub fn changes(&self) -> Option<(&[Vec<String>], &[PatchOp])> {
        let paths = self.changed_paths.as_deref()?;
        Some((paths, self.patch.as_deref().unwrap_or_default()))
    }
}

/// Every message the protocol sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    /// Replica has attached its listeners.
    #[serde(rename = "replica:ready")]
    Ready,

    /// Replica asks origin for the initial state (pull mode).
    #[serde(rename = "replica:rq-initial-state")]
    InitialStateRequest,

    /// Full state snapshot.
    #[serde(rename = "replica:initial-state")]
    InitialState { state: StateValue },

    /// Replica forwards an action to origin.
    #[serde(rename = "replica:dispatched")]
    ActionDispatched { action: Action },

    /// Origin has reduced an action.
    #[serde(rename = "replica:action-processed")]
    ActionProcessed(ActionProcessed),
}

impl ProtocolEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProtocolEvent::Ready => EventKind::Ready,
            ProtocolEvent::InitialStateRequest => EventKind::InitialStateRequest,
            ProtocolEvent::InitialState { .. } => EventKind::InitialState,
            ProtocolEvent::ActionDispatched { .. } => EventKind::ActionDispatched,
            ProtocolEvent::ActionProcessed(_) => EventKind::ActionProcessed,
        }
    }

    /// Decode a raw channel message.
    ///
    /// - `Ok(None)`: not one of ours (no `type`, or an unknown tag)
    /// - `Err(MalformedEvent)`: our tag, but the payload does not fit
    /// - `Ok(Some(event))`: a protocol event
    pub fn decode(message: &Value) -> Result<Option<ProtocolEvent>> {
        let Some(kind) = EventKind::of(message) else {
            return Ok(None);
        };

        ProtocolEvent::deserialize(message)
            .map(Some)
            .map_err(|e| ProtocolError::MalformedEvent {
                kind,
                message: e.to_string(),
            })
    }

    /// Encode for posting on a channel.
    pub fn to_message(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
