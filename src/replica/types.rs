// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Protocol state types.
//!
//! Defines the handshake state machine shared by both sides of a channel.
//!
//! # State Transitions
//!
//! ```text
//!                     resolve()
//! Uninitialized ─────────────────→ AwaitingInitialState
//!    │                                     │
//!    │ build()                             │ (initial state received)
//!    ↓                                     ↓
//!  Ready ←─────────────────────────────────┘
//!    │
//!    │ (first action processed)
//!    ↓
//!  Steady ──┐
//!    ↑      │ (every further action)
//!    └──────┘
//! ```
//!
//! # State Descriptions
//!
//! - **Uninitialized**: Nothing sent or received yet.
//! - **AwaitingInitialState**: Replica asked origin for the initial state and
//!   is waiting on the handshake deadline.
//! - **Ready**: Listeners attached and the ready signal exchanged. No action
//!   has been processed yet.
//! - **Steady**: At least one action has been processed; every further action
//!   produces at most one update.

/// Handshake state of one side of a channel.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolState {
    /// No handshake traffic yet.
    Uninitialized,

    /// Waiting for origin to answer an initial-state request.
    AwaitingInitialState,

    /// Listeners attached, no action processed yet.
    Ready,

    /// Processing actions.
    Steady,
}

impl ProtocolState {
    /// Whether the side can process actions.
    pub fn is_ready(&self) -> bool {
        matches!(self, ProtocolState::Ready | ProtocolState::Steady)
    }
}

impl std::fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolState::Uninitialized => write!(f, "Uninitialized"),
            ProtocolState::AwaitingInitialState => write!(f, "AwaitingInitialState"),
            ProtocolState::Ready => write!(f, "Ready"),
            ProtocolState::Steady => write!(f, "Steady"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_state_display() {
        assert_eq!(ProtocolState::Uninitialized.to_string(), "Uninitialized");
        assert_eq!(ProtocolState::AwaitingInitialState.to_string(), "AwaitingInitialState");
        assert_eq!(ProtocolState::Ready.to_string(), "Ready");
        assert_eq!(ProtocolState::Steady.to_string(), "Steady");
    }

    #[test]
    fn test_protocol_state_is_ready() {
        assert!(!ProtocolState::Uninitialized.is_ready());
        assert!(!ProtocolState::AwaitingInitialState.is_ready());
        assert!(ProtocolState::Ready.is_ready());
        assert!(ProtocolState::Steady.is_ready());
    }

    #[test]
    fn test_protocol_state_ordering_follows_lifecycle() {
        assert!(ProtocolState::Uninitialized < ProtocolState::AwaitingInitialState);
        assert!(ProtocolState::AwaitingInitialState < ProtocolState::Ready);
        assert!(ProtocolState::Ready < ProtocolState::Steady);
    }
}
