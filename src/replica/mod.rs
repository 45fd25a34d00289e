// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replica store facade.
//!
//! [`ReplicaStore`] looks like a local store but holds no reducer. It keeps a
//! read-only mirror of origin's state and forwards every dispatched action to
//! origin. When origin reports the action as processed, the mirror is rebuilt
//! with [`reconcile`](crate::reconcile::reconcile) and change listeners run.
//!
//! # Architecture
//!
//! ```text
//!   consumer                 ReplicaStore                     origin
//!      │  dispatch(action)        │                              │
//!      ├─────────────────────────→├── replica:dispatched ───────→│
//!      │                          │                              │ reduce
//!      │                          │←── replica:action-processed ─┤ diff
//!      │                          │    reconcile mirror          │
//!      │←── on_change(a, new, old)┤                              │
//!      │                          ├──→ observer.send(a, state)   │
//! ```
//!
//! Dispatch never touches the mirror; the state only changes when origin's
//! answer arrives, so a consumer reading state right after `dispatch` sees the
//! old value.
//!
//! # Construction
//!
//! | Builder call | Initial state | Sent on build |
//! |--------------|---------------|---------------|
//! | `.initial_state(s).build()` | `s` | `replica:ready` |
//! | `.initial_state(s).build()` with `sync_initial_state` | `s` | `replica:initial-state`, then `replica:ready` |
//! | `.resolve().await` without a state | from origin | `replica:rq-initial-state`, then `replica:ready` |

mod inbound;
mod observer;
mod subscribers;
mod types;

pub use observer::{ObserverConnector, StateObserver, TracingObserver, TracingObserverConnector};
pub use subscribers::{ChangeListener, Subscription};
pub use types::ProtocolState;

use crate::config::ReplicaConfig;
use crate::error::{ProtocolError, Result};
use crate::event::{Action, ActionProcessed, EventKind, ProtocolEvent};
use crate::handshake::PendingEvent;
use crate::metrics;
use crate::origin::Reducer;
use crate::reconcile::reconcile;
use crate::transport::{ensure_role, ListenerGuard, Message, Role, SharedPort};
use crate::value::StateValue;
use parking_lot::Mutex;
use std::sync::Arc;
use inbound::Inbound;
use std::time::Instant;
use subscribers::SubscriberSet;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, instrument, trace, warn, Span};

/// Builds a [`ReplicaStore`].
///
/// Validation happens before anything is posted on the channel.
pub struct ReplicaBuilder {
    config: ReplicaConfig,
    port: Option<SharedPort>,
    initial_state: Option<StateValue>,
    connector: Option<Arc<dyn ObserverConnector>>,
}

impl ReplicaBuilder {
    /// Channel endpoint to origin. Must be a replica-side port.
    pub fn channel(mut self, port: SharedPort) -> Self {
        self.port = Some(port);
        self
    }

    /// Locally known initial state.
    pub fn initial_state(mut self, state: impl Into<StateValue>) -> Self {
        self.initial_state = Some(state.into());
        self
    }

    /// Connector used when the config enables the observer.
    pub fn observer_connector(mut self, connector: Arc<dyn ObserverConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Build with the locally supplied initial state.
    ///
    /// Pushes that state to origin first when `sync_initial_state` is set.
    pub fn build(self) -> Result<ReplicaStore> {
        self.config.validate()?;
        let port = required_port(self.port)?;
        let state = self
            .initial_state
            .ok_or_else(|| ProtocolError::Config("initial state is required".to_string()))?;

        let inbound = Inbound::attach(&port);
        ReplicaStore::start(
            &self.config,
            port,
            inbound,
            state,
            self.config.sync_initial_state,
            self.connector,
            ProtocolState::Uninitialized,
        )
    }

    /// Build, asking origin for the initial state if none was supplied.
    ///
    /// Fails with [`ProtocolError::Timeout`] if origin does not answer within
    /// the handshake deadline. No listener is left behind on failure.
    #[instrument(skip_all, fields(side = "replica"))]
    pub async fn resolve(self) -> Result<ReplicaStore> {
        if self.initial_state.is_some() {
            return self.build();
        }

        let ReplicaBuilder {
            config,
            port,
            connector,
            ..
        } = self;
        config.validate()?;
        let port = required_port(port)?;

        metrics::set_protocol_state(Role::Replica, "AwaitingInitialState");

        // Attached before the request goes out: anything origin sends after
        // the initial state is held until the store can apply it.
        let inbound = Inbound::attach(&port);
        let pending = PendingEvent::listen(
            &port,
            EventKind::InitialState,
            config.handshake.timeout_duration(),
        );
        port.post_event(&ProtocolEvent::InitialStateRequest)?;
        debug!("Requested initial state from origin");

        let state = match pending.wait().await? {
            ProtocolEvent::InitialState { state } => state,
            other => {
                return Err(ProtocolError::MalformedEvent {
                    kind: other.kind(),
                    message: "expected an initial state".to_string(),
                })
            }
        };

        ReplicaStore::start(
            &config,
            port,
            inbound,
            state,
            false,
            connector,
            ProtocolState::AwaitingInitialState,
        )
    }
}

fn required_port(port: Option<SharedPort>) -> Result<SharedPort> {
    let port = port.ok_or_else(|| ProtocolError::Config("channel is required".to_string()))?;
    ensure_role(port.as_ref(), Role::Replica)?;
    Ok(port)
}

/// Read-only mirror of origin's state with a dispatch-forwarding facade.
///
/// Dropping the store detaches it from the channel.
pub struct ReplicaStore {
    inner: Arc<ReplicaInner>,
    _listener: ListenerGuard,
}

struct ReplicaInner {
    port: SharedPort,
    state: Mutex<StateValue>,
    subscribers: Arc<SubscriberSet>,
    observer: Option<Arc<dyn StateObserver>>,
    state_tx: watch::Sender<ProtocolState>,
    state_rx: watch::Receiver<ProtocolState>,
    span: Span,
}

impl ReplicaStore {
    /// Start building a replica store.
    pub fn builder(config: ReplicaConfig) -> ReplicaBuilder {
        ReplicaBuilder {
            config,
            port: None,
            initial_state: None,
            connector: None,
        }
    }

    fn start(
        config: &ReplicaConfig,
        port: SharedPort,
        inbound: Inbound,
        initial_state: StateValue,
        push_initial_state: bool,
        connector: Option<Arc<dyn ObserverConnector>>,
        protocol_state: ProtocolState,
    ) -> Result<ReplicaStore> {
        let span = info_span!("replica");
        let _entered = span.clone().entered();

        if push_initial_state {
            port.post_event(&ProtocolEvent::InitialState {
                state: initial_state.clone(),
            })?;
            debug!("Pushed initial state to origin");
        }

        let observer = connect_observer(config, connector);
        if let Some(observer) = &observer {
            observer.init(&initial_state);
        }
        let observed = observer.is_some();

        let (state_tx, state_rx) = watch::channel(protocol_state);
        let inner = Arc::new(ReplicaInner {
            port,
            state: Mutex::new(initial_state),
            subscribers: Arc::new(SubscriberSet::default()),
            observer,
            state_tx,
            state_rx,
            span,
        });

        inner.port.post_event(&ProtocolEvent::Ready)?;
        inner.advance(ProtocolState::Ready);
        let guard = inbound.open(&inner);
        info!(
            push_initial_state,
            observer = observed,
            "Replica store ready"
        );

        Ok(ReplicaStore {
            inner,
            _listener: guard,
        })
    }

    /// Current mirror. Cheap: containers are shared, not copied.
    pub fn get_state(&self) -> StateValue {
        self.inner.state.lock().clone()
    }

    /// Forward an action to origin.
    ///
    /// Posts exactly one `replica:dispatched` event and returns the action.
    /// The mirror is not touched until origin answers.
    pub fn dispatch(&self, action: Action) -> Result<Action> {
        let _entered = self.inner.span.enter();
        trace!(action = %action.kind, "Dispatching action to origin");
        self.inner.port.post_event(&ProtocolEvent::ActionDispatched {
            action: action.clone(),
        })?;
        Ok(action)
    }

    /// Register a listener that takes no arguments.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let wrapped: ChangeListener = Arc::new(move |_: &Action, _: &StateValue, _: &StateValue| {
            listener()
        });
        self.on_change(wrapped)
    }

    /// Register a `(action, new_state, old_state)` listener.
    ///
    /// Registering the same `Arc` twice has no effect; the returned
    /// subscription removes it either way.
    pub fn on_change(&self, listener: ChangeListener) -> Subscription {
        if !self.inner.subscribers.add(Arc::clone(&listener)) {
            trace!("Change listener already registered");
        }
        Subscription::new(&self.inner.subscribers, listener)
    }

    /// Number of registered change listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Replicas have no reducer; this always fails.
    pub fn replace_reducer<R: Reducer>(&self, _next: R) -> Result<()> {
        Err(ProtocolError::Unsupported("replace_reducer"))
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

impl std::fmt::Debug for ReplicaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStore")
            .field("protocol_state", &self.protocol_state())
            .field("subscribers", &self.subscriber_count())
            .field("observer", &self.inner.observer.is_some())
            .finish()
    }
}

fn connect_observer(
    config: &ReplicaConfig,
    connector: Option<Arc<dyn ObserverConnector>>,
) -> Option<Arc<dyn StateObserver>> {
    let options = config.observer.options()?;
    let Some(connector) = connector else {
        debug!("Observer enabled but no connector supplied, skipping");
        return None;
    };
    let observer = connector.connect(&options);
    if observer.is_none() {
        debug!("Observer connector unavailable, skipping");
    }
    observer
}

impl ReplicaInner {
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
            metrics::set_protocol_state(Role::Replica, &next.to_string());
        }
        advanced
    }

    fn handle_message(&self, message: &Message) {
        let _entered = self.span.enter();
        match ProtocolEvent::decode(message) {
            Ok(Some(ProtocolEvent::ActionProcessed(processed))) => {
                metrics::record_event_received(Role::Replica, EventKind::ActionProcessed);
                self.apply_processed(processed);
            }
            Ok(Some(event)) => {
                trace!(event = %event.kind(), "Ignoring event not handled by replica");
                metrics::record_message_dropped(Role::Replica, "unexpected");
            }
            Ok(None) => {
                trace!("Ignoring foreign message");
                metrics::record_message_dropped(Role::Replica, "foreign");
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                metrics::record_message_dropped(Role::Replica, "malformed");
            }
        }
    }

    fn apply_processed(&self, processed: ActionProcessed) {
        let (new_state, old_state) = match processed.changes() {
            None => {
                let current = self.state.lock().clone();
                metrics::record_noop_applied();
                trace!(action = %processed.action.kind, "Action left state unchanged");
                (current.clone(), current)
            }
            Some((paths, patch)) => {
                let start = Instant::now();
                let mut state = self.state.lock();
                match reconcile(&state, Some(paths), patch) {
                    Ok(next) => {
                        let old = std::mem::replace(&mut *state, next.clone());
                        drop(state);
                        metrics::record_reconcile(true, start.elapsed());
                        trace!(
                            action = %processed.action.kind,
                            changed_paths = paths.len(),
                            patch_ops = patch.len(),
                            "Reconciled replica state"
                        );
                        (next, old)
                    }
                    Err(e) => {
                        drop(state);
                        metrics::record_reconcile(false, start.elapsed());
                        error!(action = %processed.action.kind, error = %e, "Failed to reconcile replica state");
                        return;
                    }
                }
            }
        };

        self.advance(ProtocolState::Steady);
        self.subscribers
            .notify(&processed.action, &new_state, &old_state);
        if let Some(observer) = &self.observer {
            observer.send(&processed.action, &new_state);
        }
    }
}
