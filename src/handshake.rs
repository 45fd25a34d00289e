// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Handshake waits with a deadline.
//!
//! A handshake step waits for exactly one message of a given kind. The wait is
//! a race between that message and a timer:
//!
//! ```text
//!   listen()                          wait()
//!     │                                 │
//!     ├─ register listener ──┐          ├─ message arrives ──→ Ok(event)
//!     │                      │          ├─ deadline elapses ─→ Err(Timeout)
//!     │                      │          └─ channel closes ───→ Err(ChannelClosed)
//!     │                      │                     │
//!     │                      └──── listener removed on every path
//! ```
//!
//! [`PendingEvent::listen`] and [`PendingEvent::wait`] are split so callers can
//! start listening before posting the request that triggers the reply.

use crate::error::{ProtocolError, Result};
use crate::event::{EventKind, ProtocolEvent};
use crate::metrics;
use crate::transport::{Listener, ListenerGuard, Message, SharedPort};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A registered, not yet resolved wait for one event kind.
#[derive(Debug)]
pub struct PendingEvent {
    kind: EventKind,
    timeout: Duration,
    started: Instant,
    rx: oneshot::Receiver<Message>,
    _guard: ListenerGuard,
}

impl PendingEvent {
    /// Register a listener for the first message tagged `kind`.
    pub fn listen(port: &SharedPort, kind: EventKind, timeout: Duration) -> Self {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let listener: Listener = Arc::new(move |message: &Message| {
            if EventKind::of(message) != Some(kind) {
                return;
            }
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(message.clone());
            }
        });

        let guard = ListenerGuard::attach(Arc::clone(port), listener);
        debug!(event = %kind, timeout_ms = timeout.as_millis() as u64, "Waiting for handshake event");

        Self {
            kind,
            timeout,
            started: Instant::now(),
            rx,
            _guard: guard,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Time since the listener was registered, on the runtime's clock.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wait for the event or the deadline, whichever comes first.
    ///
    /// The listener is removed when this returns, on every path.
    pub async fn wait(self) -> Result<ProtocolEvent> {
        let PendingEvent {
            kind,
            timeout,
            started,
            rx,
            _guard,
        } = self;

        let remaining = timeout.saturating_sub(started.elapsed());
        let outcome = tokio::time::timeout(remaining, rx).await;
        drop(_guard);

        match outcome {
            Ok(Ok(message)) => settle(kind, &message, started.elapsed()),
            Ok(Err(_)) => {
                metrics::record_handshake(kind, "closed", started.elapsed());
                warn!(event = %kind, "Channel closed during handshake");
                Err(ProtocolError::ChannelClosed)
            }
            Err(_) => {
                metrics::record_handshake(kind, "timeout", started.elapsed());
                warn!(event = %kind, timeout_ms = timeout.as_millis() as u64, "Handshake timed out");
                Err(ProtocolError::Timeout {
                    expected: kind,
                    timeout,
                })
            }
        }
    }
}

/// Decode the message that ended a wait for `kind` and record the outcome.
fn settle(kind: EventKind, message: &Message, elapsed: Duration) -> Result<ProtocolEvent> {
    let decoded = ProtocolEvent::decode(message).and_then(|event| {
        event.ok_or_else(|| ProtocolError::MalformedEvent {
            kind,
            message: "missing type tag".to_string(),
        })
    });

    match decoded {
        Ok(event) => {
            metrics::record_handshake(kind, "ok", elapsed);
            debug!(event = %kind, elapsed_ms = elapsed.as_millis() as u64, "Handshake event received");
            Ok(event)
        }
        Err(e) => {
            metrics::record_handshake(kind, "malformed", elapsed);
            warn!(event = %kind, error = %e, "Malformed handshake event");
            Err(e)
        }
    }
}

/// Listen for `kind` and wait for it.
pub async fn await_event(port: &SharedPort, kind: EventKind, timeout: Duration) -> Result<ProtocolEvent> {
    PendingEvent::listen(port, kind, timeout).wait().await
}
