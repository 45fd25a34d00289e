// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replica's channel listener.
//!
//! The listener is attached before the store exists so that nothing origin
//! sends while the store is starting is lost:
//!
//! ```text
//!   attach()                              open(inner)
//!     │   Hold: messages buffered            │   replay buffer, then
//!     │   (initial state clears it)          │   Deliver: straight to store
//!     ▼                                      ▼
//!   ──●──────────────────────────────────────●─────────────────────────→
//! ```

use super::ReplicaInner;
use crate::event::EventKind;
use crate::transport::{Listener, ListenerGuard, Message, SharedPort};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

enum Route {
    Hold(Vec<Message>),
    Deliver(Weak<ReplicaInner>),
}

struct Relay {
    route: Mutex<Route>,
}

impl Relay {
    fn accept(&self, message: &Message) {
        let mut route = self.route.lock();
        let target = match &mut *route {
            Route::Hold(pending) => {
                // Origin's snapshot already reflects everything sent before it.
                if EventKind::of(message) == Some(EventKind::InitialState) {
                    pending.clear();
                } else {
                    pending.push(message.clone());
                }
                return;
            }
            Route::Deliver(inner) => Weak::clone(inner),
        };
        drop(route);

        if let Some(inner) = target.upgrade() {
            inner.handle_message(message);
        }
    }
}

/// Channel registration of a replica store that may not exist yet.
pub(super) struct Inbound {
    relay: Arc<Relay>,
    guard: ListenerGuard,
}

impl Inbound {
    /// Start listening, holding messages until [`Inbound::open`].
    pub(super) fn attach(port: &SharedPort) -> Self {
        let relay = Arc::new(Relay {
            route: Mutex::new(Route::Hold(Vec::new())),
        });
        let listener: Listener = {
            let relay = Arc::clone(&relay);
            Arc::new(move |message: &Message| relay.accept(message))
        };
        let guard = ListenerGuard::attach(Arc::clone(port), listener);
        Self { relay, guard }
    }

    /// Replay held messages into `inner` in arrival order, then deliver
    /// directly. Messages arriving during the replay queue behind it.
    pub(super) fn open(self, inner: &Arc<ReplicaInner>) -> ListenerGuard {
        loop {
            let pending = {
                let mut route = self.relay.route.lock();
                let pending = match &mut *route {
                    Route::Hold(pending) => std::mem::take(pending),
                    Route::Deliver(_) => Vec::new(),
                };
                if pending.is_empty() {
                    *route = Route::Deliver(Arc::downgrade(inner));
                    break;
                }
                pending
            };

            debug!(count = pending.len(), "Replaying messages received during start");
            for message in &pending {
                inner.handle_message(message);
            }
        }
        self.guard
    }
}
