// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Origin side of the protocol.
//!
//! Origin owns the canonical state and the reducer. After every reduction it
//! diffs the old and new state and tells the replica what changed:
//!
//! ```text
//!   replica:dispatched ──→ reduce(old, action) = new
//!                                  │
//!                          compare(old, new) = patch
//!                                  │
//!                       changed_paths(patch) = paths
//!                                  │
//!   replica:action-processed ←─────┘  {action, changedPaths, patch}
//!                                     (changedPaths: null when patch is empty)
//! ```
//!
//! [`OriginStore`] runs that loop over a channel. Hosts with their own store
//! can call [`publish_processed`] directly after each reduction instead.
//!
//! # Handshakes
//!
//! | Replica does | Origin calls |
//! |--------------|--------------|
//! | `resolve()` without a state (pull) | [`provide_initial_state`] |
//! | `build()` with `sync_initial_state` (push) | [`on_initial_state_received`] |
//! | any build | [`on_ready`] |
//!
//! Messages are not buffered for listeners that do not exist yet, so origin
//! must start waiting before the replica is built.

use crate::changed_paths::changed_paths;
use crate::config::HandshakeConfig;
use crate::error::{ProtocolError, Result};
use crate::event::{Action, ActionProcessed, EventKind, ProtocolEvent};
use crate::handshake::await_event;
use crate::metrics;
use crate::patch::compare;
use crate::replica::ProtocolState;
use crate::transport::{ensure_role, Listener, ListenerGuard, Message, MessagePort, Role, SharedPort};
use crate::value::StateValue;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, instrument, trace, warn, Span};

/// Produces the next canonical state from the current one and an action.
///
/// Reducers must not mutate shared nodes; build the result with
/// copy-on-write helpers such as [`StateValue::set_pointer`].
pub trait Reducer: Send + Sync + 'static {
    fn reduce(&self, state: &StateValue, action: &Action) -> StateValue;
}

impl<F> Reducer for F
where
    F: Fn(&StateValue, &Action) -> StateValue + Send + Sync + 'static,
{
    fn reduce(&self, state: &StateValue, action: &Action) -> StateValue {
        self(state, action)
    }
}

/// Publish the result of one reduction to the replica.
///
/// Deeply-equal states produce a no-op event. A non-empty patch with no
/// nested paths (top-level edits only) is sent with `changedPaths: []` so the
/// replica still applies it.
pub fn publish_processed(
    port: &dyn MessagePort,
    action: &Action,
    old_state: &StateValue,
    new_state: &StateValue,
) -> Result<()> {
    ensure_role(port, Role::Origin)?;
    let start = Instant::now();

    let patch = compare(old_state, new_state);
    let processed = if patch.is_empty() {
        ActionProcessed::noop(action.clone())
    } else {
        let paths = changed_paths(&patch).unwrap_or_default();
        ActionProcessed::with_changes(action.clone(), paths, patch)
    };

    let patch_ops = processed.patch.as_ref().map_or(0, Vec::len);
    let path_count = processed.changed_paths.as_ref().map_or(0, Vec::len);
    port.post_event(&ProtocolEvent::ActionProcessed(processed))?;

    metrics::record_action_processed(patch_ops, path_count, start.elapsed());
    trace!(action = %action.kind, patch_ops, changed_paths = path_count, "Published processed action");
    Ok(())
}

/// Canonical store driving the origin side of a channel.
///
/// Every `replica:dispatched` event received on the port is reduced and
/// published, one at a time, in arrival order. Dropping the store detaches it
/// from the channel.
pub struct OriginStore {
    inner: Arc<OriginInner>,
    _listener: ListenerGuard,
}

struct OriginInner {
    port: SharedPort,
    reducer: Box<dyn Reducer>,
    state: Mutex<StateValue>,
    state_tx: watch::Sender<ProtocolState>,
    state_rx: watch::Receiver<ProtocolState>,
    span: Span,
}

impl OriginStore {
    /// Attach a store to an origin-side port.
    pub fn new(
        port: SharedPort,
        reducer: impl Reducer,
        initial_state: impl Into<StateValue>,
    ) -> Result<Self> {
        ensure_role(port.as_ref(), Role::Origin)?;

        let (state_tx, state_rx) = watch::channel(ProtocolState::Uninitialized);
        let inner = Arc::new(OriginInner {
            port: Arc::clone(&port),
            reducer: Box::new(reducer),
            state: Mutex::new(initial_state.into()),
            state_tx,
            state_rx,
            span: info_span!("origin"),
        });

        let weak = Arc::downgrade(&inner);
        let listener: Listener = Arc::new(move |message: &Message| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_message(message);
            }
        });
        let guard = ListenerGuard::attach(port, listener);
        debug!("Origin store attached");

        Ok(Self {
            inner,
            _listener: guard,
        })
    }

    /// Reduce a locally originated action and publish it.
    ///
    /// Returns the new canonical state.
    pub fn dispatch(&self, action: Action) -> Result<StateValue> {
        self.inner.process(&action)
    }

    /// Current canonical state.
    pub fn get_state(&self) -> StateValue {
        self.inner.state.lock().clone()
    }

    /// Get current protocol state.
    pub fn protocol_state(&self) -> ProtocolState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver to watch protocol state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ProtocolState> {
        self.inner.state_rx.clone()
    }
}

impl std::fmt::Debug for OriginStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OriginStore")
            .field("protocol_state", &self.protocol_state())
            .finish()
    }
}

impl OriginInner {
    /// Move forward to `next`; never moves back.
    fn advance(&self, next: ProtocolState) -> bool {
        let advanced = self.state_tx.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if advanced {
            metrics::set_protocol_state(Role::Origin, &next.to_string());
        }
        advanced
    }

    fn process(&self, action: &Action) -> Result<StateValue> {
        let _entered = self.span.enter();
        let mut state = self.state.lock();
        let old_state = state.clone();
        let new_state = self.reducer.reduce(&old_state, action);
        *state = new_state.clone();

        // Publish under the lock so events leave in processing order.
        let published = publish_processed(self.port.as_ref(), action, &old_state, &new_state);
        drop(state);

        self.advance(ProtocolState::Steady);
        published.map(|()| new_state)
    }

    fn handle_message(&self, message: &Message) {
        let _entered = self.span.enter();
        match ProtocolEvent::decode(message) {
            Ok(Some(ProtocolEvent::ActionDispatched { action })) => {
                metrics::record_event_received(Role::Origin, EventKind::ActionDispatched);
                if let Err(e) = self.process(&action) {
                    error!(action = %action.kind, error = %e, "Failed to publish processed action");
                }
            }
            Ok(Some(ProtocolEvent::Ready)) => {
                metrics::record_event_received(Role::Origin, EventKind::Ready);
                info!("Replica ready");
                self.advance(ProtocolState::Ready);
            }
            Ok(Some(event)) => {
                // Initial state traffic belongs to the handshake helpers.
                trace!(event = %event.kind(), "Ignoring event not handled by origin store");
            }
            Ok(None) => {
                trace!("Ignoring foreign message");
                metrics::record_message_dropped(Role::Origin, "foreign");
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                metrics::record_message_dropped(Role::Origin, "malformed");
            }
        }
    }
}

/// Wait for the replica's initial-state request, then answer it with `state`.
#[instrument(skip_all, fields(side = "origin"))]
pub async fn provide_initial_state(
    port: &SharedPort,
    state: &StateValue,
    config: &HandshakeConfig,
) -> Result<()> {
    ensure_role(port.as_ref(), Role::Origin)?;
    await_event(port, EventKind::InitialStateRequest, config.timeout_duration()).await?;
    port.post_event(&ProtocolEvent::InitialState {
        state: state.clone(),
    })?;
    info!("Initial state provided to replica");
    Ok(())
}

/// Wait for a replica to push its initial state and return it.
#[instrument(skip_all, fields(side = "origin"))]
pub async fn on_initial_state_received(
    port: &SharedPort,
    config: &HandshakeConfig,
) -> Result<StateValue> {
    ensure_role(port.as_ref(), Role::Origin)?;
    match await_event(port, EventKind::InitialState, config.timeout_duration()).await? {
        ProtocolEvent::InitialState { state } => {
            info!("Initial state received from replica");
            Ok(state)
        }
        other => Err(ProtocolError::MalformedEvent {
            kind: other.kind(),
            message: "expected an initial state".to_string(),
        }),
    }
}

/// Wait for the replica to signal that its listeners are attached.
#[instrument(skip_all, fields(side = "origin"))]
pub async fn on_ready(port: &SharedPort, config: &HandshakeConfig) -> Result<()> {
    ensure_role(port.as_ref(), Role::Origin)?;
    await_event(port, EventKind::Ready, config.timeout_duration()).await?;
    info!("Replica ready");
    Ok(())
}
