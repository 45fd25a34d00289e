// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport abstraction.
//!
//! Origin and replica share no memory. Each side talks to the other through a
//! [`MessagePort`]: an endpoint that posts owned JSON messages to its peer and
//! invokes locally registered listeners for every message the peer posts.
//!
//! The trait is all the protocol needs; hosts wire it to whatever actually
//! carries the bytes (a worker channel, a socket, a pipe). The crate ships
//! [`MessageChannel`], an in-memory pair built on Tokio channels, used by the
//! tests and by hosts running both sides in one process.
//!
//! # In-Memory Channel
//!
//! ```text
//!   origin endpoint                          replica endpoint
//!  ┌────────────────┐   unbounded mpsc     ┌────────────────┐
//!  │ post_message ──┼──────────────────────┼→ delivery task │
//!  │                │                      │   → listeners  │
//!  │  listeners ←── │   delivery task  ←───┼── post_message │
//!  └────────────────┘                      └────────────────┘
//! ```
//!
//! Each direction is FIFO. Delivery is asynchronous: a listener never runs
//! inside the `post_message` call that produced its message.

use crate::error::{ProtocolError, Result};
use crate::event::ProtocolEvent;
use crate::metrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A structurally cloned message: always an owned JSON value.
pub type Message = serde_json::Value;

/// Callback invoked for every message received on a port.
pub type Listener = Arc<dyn Fn(&Message) + Send + Sync>;

/// Shared handle to a port, as held by stores and handshakes.
pub type SharedPort = Arc<dyn MessagePort>;

/// Which side of the protocol an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Owns the canonical state and the reducer.
    Origin,
    /// Holds the read-only mirror.
    Replica,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Origin => "origin",
            Role::Replica => "replica",
        }
    }

    /// The side on the other end of the channel.
    pub fn peer(self) -> Role {
        match self {
            Role::Origin => Role::Replica,
            Role::Replica => Role::Origin,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle returned by [`MessagePort::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// One end of a bidirectional message channel.
pub trait MessagePort: Send + Sync + 'static {
    /// Side this endpoint belongs to.
    fn role(&self) -> Role;

    /// Post a message to the peer.
    ///
    /// Returns [`ProtocolError::ChannelClosed`] if the peer is gone.
    fn post_message(&self, message: Message) -> Result<()>;

    /// Register a listener for messages from the peer.
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Deregister a listener. Returns `false` if it was not registered.
    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Encode and post a protocol event.
    fn post_event(&self, event: &ProtocolEvent) -> Result<()> {
        let message = event.to_message()?;
        trace!(side = %self.role(), event = %event.kind(), "Posting event");
        self.post_message(message)?;
        metrics::record_event_sent(self.role(), event.kind());
        Ok(())
    }
}

/// Check that `port` belongs to `expected`.
pub fn ensure_role(port: &dyn MessagePort, expected: Role) -> Result<()> {
    let actual = port.role();
    if actual == expected {
        Ok(())
    } else {
        Err(ProtocolError::WrongSide { expected, actual })
    }
}

/// Removes its listener from the port when dropped.
pub struct ListenerGuard {
    port: SharedPort,
    id: ListenerId,
}

impl ListenerGuard {
    /// Register `listener` on `port` for the lifetime of the guard.
    pub fn attach(port: SharedPort, listener: Listener) -> Self {
        let id = port.add_listener(listener);
        Self { port, id }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.port.remove_listener(self.id);
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("side", &self.port.role())
            .field("id", &self.id)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory channel
// ═══════════════════════════════════════════════════════════════════════════════

/// Listener table of one endpoint.
#[derive(Default)]
struct Inbox {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Inbox {
    fn snapshot(&self) -> Vec<Listener> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Builds connected [`ChannelEndpoint`] pairs.
pub struct MessageChannel;

impl MessageChannel {
    /// Create a connected `(origin, replica)` pair.
    ///
    /// Spawns one delivery task per direction, so this must be called from
    /// within a Tokio runtime.
    pub fn pair() -> (Arc<ChannelEndpoint>, Arc<ChannelEndpoint>) {
        let origin_inbox = Arc::new(Inbox::default());
        let replica_inbox = Arc::new(Inbox::default());

        let (to_replica, replica_rx) = mpsc::unbounded_channel();
        let (to_origin, origin_rx) = mpsc::unbounded_channel();

        tokio::spawn(deliver(replica_rx, Arc::downgrade(&replica_inbox), Role::Replica));
        tokio::spawn(deliver(origin_rx, Arc::downgrade(&origin_inbox), Role::Origin));

        let origin = Arc::new(ChannelEndpoint {
            role: Role::Origin,
            inbox: Arc::clone(&origin_inbox),
            peer: Arc::downgrade(&replica_inbox),
            outbox: to_replica,
            next_id: AtomicU64::new(1),
        });
        let replica = Arc::new(ChannelEndpoint {
            role: Role::Replica,
            inbox: replica_inbox,
            peer: Arc::downgrade(&origin_inbox),
            outbox: to_origin,
            next_id: AtomicU64::new(1),
        });

        debug!("Message channel opened");
        (origin, replica)
    }
}

/// One side of an in-memory [`MessageChannel`].
pub struct ChannelEndpoint {
    role: Role,
    inbox: Arc<Inbox>,
    peer: Weak<Inbox>,
    outbox: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
}

impl ChannelEndpoint {
    /// Number of listeners currently registered on this endpoint.
    pub fn listener_count(&self) -> usize {
        self.inbox.listeners.lock().len()
    }

    /// Whether the peer endpoint is still alive.
    pub fn is_connected(&self) -> bool {
        self.peer.strong_count() > 0 && !self.outbox.is_closed()
    }
}

impl MessagePort for ChannelEndpoint {
    fn role(&self) -> Role {
        self.role
    }

    fn post_message(&self, message: Message) -> Result<()> {
        if self.peer.strong_count() == 0 {
            return Err(ProtocolError::ChannelClosed);
        }
        self.outbox
            .send(message)
            .map_err(|_| ProtocolError::ChannelClosed)
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.inbox.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inbox.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl std::fmt::Debug for ChannelEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelEndpoint")
            .field("role", &self.role)
            .field("listeners", &self.listener_count())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Drain one direction of the channel into the receiving side's listeners.
///
/// Ends when the sender is dropped or the receiving endpoint is gone. On exit
/// the receiving side's listeners are released, which wakes any pending
/// handshake with a closed-channel error.
async fn deliver(mut rx: mpsc::UnboundedReceiver<Message>, inbox: Weak<Inbox>, side: Role) {
    while let Some(message) = rx.recv().await {
        let Some(target) = inbox.upgrade() else {
            break;
        };
        // Listeners may add or remove listeners, so never call them under the lock.
        let listeners = target.snapshot();
        drop(target);
        for listener in listeners {
            listener(&message);
        }
    }

    if let Some(target) = inbox.upgrade() {
        target.listeners.lock().clear();
    }
    debug!(side = %side, "Message channel delivery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collector() -> (Listener, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: Listener = Arc::new(move |message: &Message| {
            let _ = tx.send(message.clone());
        });
        (listener, rx)
    }

    #[test]
    fn test_role_display_and_peer() {
        assert_eq!(Role::Origin.to_string(), "origin");
        assert_eq!(Role::Replica.to_string(), "replica");
        assert_eq!(Role::Origin.peer(), Role::Replica);
        assert_eq!(Role::Replica.peer(), Role::Origin);
    }

    #[tokio::test]
    async fn test_pair_roles() {
        let (origin, replica) = MessageChannel::pair();
        assert_eq!(origin.role(), Role::Origin);
        assert_eq!(replica.role(), Role::Replica);
        assert!(origin.is_connected());
    }

    #[tokio::test]
    async fn test_messages_delivered_in_order() {
        let (origin, replica) = MessageChannel::pair();
        let (listener, mut rx) = collector();
        origin.add_listener(listener);

        for i in 0..5 {
            replica.post_message(json!({"seq": i})).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), json!({"seq": i}));
        }
    }

    #[tokio::test]
    async fn test_delivery_is_not_reentrant() {
        let (origin, replica) = MessageChannel::pair();
        let (listener, mut rx) = collector();
        replica.add_listener(listener);

        origin.post_message(json!({"n": 1})).unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(rx.recv().await.unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_every_listener_sees_message() {
        let (origin, replica) = MessageChannel::pair();
        let (first, mut rx1) = collector();
        let (second, mut rx2) = collector();
        replica.add_listener(first);
        replica.add_listener(second);

        origin.post_message(json!("hello")).unwrap();
        assert_eq!(rx1.recv().await.unwrap(), json!("hello"));
        assert_eq!(rx2.recv().await.unwrap(), json!("hello"));
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let (origin, _replica) = MessageChannel::pair();
        let (listener, _rx) = collector();
        let id = origin.add_listener(listener);
        assert_eq!(origin.listener_count(), 1);
        assert!(origin.remove_listener(id));
        assert!(!origin.remove_listener(id));
        assert_eq!(origin.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_guard_removes_on_drop() {
        let (origin, _replica) = MessageChannel::pair();
        let port: SharedPort = origin.clone();
        let (listener, _rx) = collector();
        {
            let guard = ListenerGuard::attach(port, listener);
            assert_eq!(origin.listener_count(), 1);
            assert!(guard.id().raw() > 0);
        }
        assert_eq!(origin.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_post_after_peer_dropped_fails() {
        let (origin, replica) = MessageChannel::pair();
        drop(replica);
        assert!(!origin.is_connected());
        let err = origin.post_message(json!({})).unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_post_event_encodes_tag() {
        let (origin, replica) = MessageChannel::pair();
        let (listener, mut rx) = collector();
        origin.add_listener(listener);

        replica.post_event(&ProtocolEvent::Ready).unwrap();
        assert_eq!(rx.recv().await.unwrap(), json!({"type": "replica:ready"}));
    }

    #[tokio::test]
    async fn test_ensure_role() {
        let (origin, replica) = MessageChannel::pair();
        assert!(ensure_role(origin.as_ref(), Role::Origin).is_ok());
        let err = ensure_role(replica.as_ref(), Role::Origin).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::WrongSide {
                expected: Role::Origin,
                actual: Role::Replica
            }
        ));
    }
}
