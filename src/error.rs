// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication protocol.
//!
//! Every fallible operation in the crate returns [`ProtocolError`]. Errors are
//! grouped by what went wrong rather than by where, and carry enough context
//! (the expected event kind, the missing field, the offending patch path) to
//! be actionable from a log line alone.
//!
//! # Error Categories
//!
//! | Error Type | Terminal | Description |
//! |------------|----------|-------------|
//! | `Config` | No | Required construction input missing or invalid |
//! | `Timeout` | Yes | Handshake message never arrived |
//! | `Unsupported` | No | Operation the replica cannot perform |
//! | `WrongSide` | Yes | Origin API used on a replica port or vice versa |
//! | `ChannelClosed` | Yes | Counterpart endpoint has gone away |
//! | `MalformedEvent` | No | Known event tag with an invalid payload |
//! | `InvalidPatch` | No | Patch operation cannot be applied to the tree |
//! | `Encode` | No | Event could not be serialized |
//!
//! # Retry Behavior
//!
//! Nothing in the protocol retries. A terminal error means the store or
//! handshake that produced it is finished; build a new one. Non-terminal
//! errors reject a single call or a single message and leave the instance
//! usable.

use crate::event::EventKind;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while replicating state.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Missing or invalid construction input.
    ///
    /// Raised synchronously, before any message is posted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An expected handshake event did not arrive before the deadline.
    #[error("Didn't receive a {expected} event in {}ms", timeout.as_millis())]
    Timeout {
        expected: EventKind,
        timeout: Duration,
    },

    /// The operation is not available on this side of the protocol.
    #[error("{0} unsupported")]
    Unsupported(&'static str),

    /// A port belonging to one side was handed to the other side's API.
    #[error("Wrong protocol side: expected {expected}, got {actual}")]
    WrongSide {
        expected: crate::transport::Role,
        actual: crate::transport::Role,
    },

    /// The counterpart endpoint was dropped.
    #[error("Message channel closed")]
    ChannelClosed,

    /// A message carried a recognized tag but its payload did not decode.
    #[error("Malformed {kind} event: {message}")]
    MalformedEvent { kind: EventKind, message: String },

    /// A patch operation could not be applied.
    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    /// Serialization of an outgoing event failed.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Create an invalid-patch error for a specific pointer.
    pub fn invalid_patch(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPatch(format!("{reason} at '{path}'"))
    }

    /// Check whether the instance that produced this error can keep going.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::WrongSide { .. } => true,
            Self::ChannelClosed => true,
            Self::Config(_) => false,
            Self::Unsupported(_) => false,
            Self::MalformedEvent { .. } => false,
            Self::InvalidPatch(_) => false,
            Self::Encode(_) => false,
        }
    }

    /// Check if this is a handshake timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Role;

    #[test]
    fn test_timeout_is_terminal() {
        let err = ProtocolError::Timeout {
            expected: EventKind::InitialState,
            timeout: Duration::from_secs(60),
        };
        assert!(err.is_terminal());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_timeout_message_names_event_and_deadline() {
        let err = ProtocolError::Timeout {
            expected: EventKind::Ready,
            timeout: Duration::from_millis(1500),
        };
        let msg = err.to_string();
        assert!(msg.contains("replica:ready"));
        assert!(msg.contains("1500ms"));
    }

    #[test]
    fn test_wrong_side_is_terminal() {
        let err = ProtocolError::WrongSide {
            expected: Role::Origin,
            actual: Role::Replica,
        };
        assert!(err.is_terminal());
        assert!(err.to_string().contains("origin"));
        assert!(err.to_string().contains("replica"));
    }

    #[test]
    fn test_channel_closed_is_terminal() {
        assert!(ProtocolError::ChannelClosed.is_terminal());
    }

    #[test]
    fn test_not_terminal_config() {
        let err = ProtocolError::Config("initial state missing".to_string());
        assert!(!err.is_terminal());
        assert!(err.to_string().contains("initial state missing"));
    }

    #[test]
    fn test_unsupported_message() {
        let err = ProtocolError::Unsupported("replace_reducer");
        assert!(!err.is_terminal());
        assert_eq!(err.to_string(), "replace_reducer unsupported");
    }

    #[test]
    fn test_invalid_patch_formatting() {
        let err = ProtocolError::invalid_patch("/a/7", "index out of bounds");
        assert!(!err.is_terminal());
        let msg = err.to_string();
        assert!(msg.contains("/a/7"));
        assert!(msg.contains("index out of bounds"));
    }

    #[test]
    fn test_malformed_event_formatting() {
        let err = ProtocolError::MalformedEvent {
            kind: EventKind::ActionDispatched,
            message: "missing field `action`".to_string(),
        };
        assert!(!err.is_terminal());
        assert!(err.to_string().contains("replica:dispatched"));
    }
}
