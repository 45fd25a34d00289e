// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fake MessagePort for testing.
//!
//! Records every posted message for assertions and delivers injected messages
//! synchronously to the registered listeners, so tests control exactly when
//! the other side "answers".

use parking_lot::Mutex;
use state_replication::{
    Listener, ListenerId, Message, MessagePort, ProtocolError, ProtocolEvent, Result, Role,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Mock implementation of MessagePort that records all posts.
///
/// # Example
/// ```rust,ignore
/// let port = FakePort::new(Role::Replica);
///
/// // Build a store on it...
///
/// // Answer as origin would
/// port.receive_event(&ProtocolEvent::Ready);
///
/// // Assert what was posted
/// assert_eq!(port.posted_types(), vec!["replica:ready"]);
/// ```
pub struct FakePort {
    role: Role,
    /// Recorded post_message() calls
    posted: Mutex<Vec<Message>>,
    /// Registered listeners in registration order
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    /// Simulate a dead counterpart
    closed: AtomicBool,
}

impl FakePort {
    pub fn new(role: Role) -> Arc<Self> {
        Arc::new(Self {
            role,
            posted: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Deliver a raw message to every listener, synchronously.
    pub fn receive(&self, message: Message) {
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&message);
        }
    }

    /// Deliver a protocol event to every listener, synchronously.
    pub fn receive_event(&self, event: &ProtocolEvent) {
        self.receive(event.to_message().expect("event encodes"));
    }

    /// All messages posted so far.
    pub fn posted(&self) -> Vec<Message> {
        self.posted.lock().clone()
    }

    /// The `type` tag of every posted message.
    pub fn posted_types(&self) -> Vec<String> {
        self.posted
            .lock()
            .iter()
            .map(|m| m["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Decoded protocol events posted so far (foreign posts skipped).
    pub fn posted_events(&self) -> Vec<ProtocolEvent> {
        self.posted
            .lock()
            .iter()
            .filter_map(|m| ProtocolEvent::decode(m).ok().flatten())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Make every further post fail with a closed-channel error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl MessagePort for FakePort {
    fn role(&self) -> Role {
        self.role
    }

    fn post_message(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProtocolError::ChannelClosed);
        }
        self.posted.lock().push(message);
        Ok(())
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
