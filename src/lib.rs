// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # State Replication
//!
//! Replicates a reducer-driven state tree from an **origin** context to a
//! read-only **replica** over message passing. The two sides share no memory;
//! every message is an owned JSON value.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────┐                      ┌───────────────────────────┐
//! │          origin           │                      │          replica          │
//! │                           │  replica:dispatched  │                           │
//! │  OriginStore ◄────────────┼──────────────────────┼── ReplicaStore::dispatch  │
//! │     │ reduce              │                      │                           │
//! │     ▼                     │                      │                           │
//! │  compare(old, new)        │                      │                           │
//! │  changed_paths(patch) ────┼──────────────────────┼─► reconcile(state,        │
//! │                           │  replica:action-     │      paths, patch)        │
//! │                           │  processed           │     │                     │
//! │                           │                      │     ▼                     │
//! │                           │                      │  on_change(a, new, old)   │
//! └───────────────────────────┘                      └───────────────────────────┘
//! ```
//!
//! ## Structural Sharing
//!
//! State containers live behind `Arc`. Origin sends only the patch and the
//! list of containers on the path to each edit; the replica copies exactly
//! those containers and shares everything else with the previous snapshot.
//! Consumers can compare subtrees with
//! [`StateValue::is_same_node`](value::StateValue::is_same_node) to skip work
//! for parts of the state that did not change.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use state_replication::{Action, MessageChannel, OriginStore, ReplicaConfig, ReplicaStore, StateValue};
//! use serde_json::json;
//!
//! # async fn run() -> state_replication::Result<()> {
//! let (origin_port, replica_port) = MessageChannel::pair();
//!
//! let origin = OriginStore::new(
//!     origin_port,
//!     |state: &StateValue, action: &Action| {
//!         let mut next = state.clone();
//!         if action.kind == "inc" {
//!             let count = state.pointer("/count").and_then(StateValue::as_i64).unwrap_or(0);
//!             let _ = next.set_pointer("/count", count + 1);
//!         }
//!         next
//!     },
//!     json!({"count": 0}),
//! )?;
//!
//! let replica = ReplicaStore::builder(ReplicaConfig::default())
//!     .channel(replica_port)
//!     .initial_state(json!({"count": 0}))
//!     .build()?;
//!
//! replica.subscribe(|| println!("state changed"));
//! replica.dispatch(Action::new("inc"))?;
//! # drop(origin);
//! # Ok(())
//! # }
//! ```

pub mod changed_paths;
pub mod config;
pub mod error;
pub mod event;
pub mod handshake;
pub mod metrics;
pub mod origin;
pub mod patch;
pub mod reconcile;
pub mod replica;
pub mod transport;
pub mod value;

// Re-exports for convenience
pub use changed_paths::{changed_paths, ChangedPaths};
pub use config::{HandshakeConfig, ObserverInit, ObserverOptions, ReplicaConfig};
pub use error::{ProtocolError, Result};
pub use event::{Action, ActionProcessed, EventKind, ProtocolEvent};
pub use handshake::{await_event, PendingEvent};
pub use origin::{
    on_initial_state_received, on_ready, provide_initial_state, publish_processed, OriginStore,
    Reducer,
};
pub use patch::{apply, compare, Patch, PatchOp};
pub use reconcile::{clone_path, reconcile};
pub use replica::{
    ChangeListener, ObserverConnector, ProtocolState, ReplicaBuilder, ReplicaStore,
    StateObserver, Subscription, TracingObserver, TracingObserverConnector,
};
pub use transport::{
    ChannelEndpoint, Listener, ListenerGuard, ListenerId, Message, MessageChannel, MessagePort,
    Role, SharedPort,
};
pub use value::StateValue;
