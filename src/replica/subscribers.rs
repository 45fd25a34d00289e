// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change listener bookkeeping.

use crate::event::Action;
use crate::metrics;
use crate::value::StateValue;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Called with `(action, new_state, old_state)` after every processed action.
pub type ChangeListener = Arc<dyn Fn(&Action, &StateValue, &StateValue) + Send + Sync>;

/// Insertion-ordered set of listeners, de-duplicated by pointer identity.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<Vec<ChangeListener>>,
}

impl SubscriberSet {
    /// Returns `false` if this exact listener is already registered.
    pub(crate) fn add(&self, listener: ChangeListener) -> bool {
        let mut entries = self.entries.lock();
        if entries.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
            return false;
        }
        entries.push(listener);
        metrics::record_subscribers_added(1);
        true
    }

    pub(crate) fn remove(&self, listener: &ChangeListener) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|existing| !Arc::ptr_eq(existing, listener));
        let removed = before - entries.len();
        if removed > 0 {
            metrics::record_subscribers_removed(removed);
        }
        removed > 0
    }

    pub(crate) fn contains(&self, listener: &ChangeListener) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|existing| Arc::ptr_eq(existing, listener))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Invoke every listener in insertion order.
    ///
    /// Runs over a snapshot with the lock released, so listeners may subscribe
    /// or unsubscribe. One removed mid-cycle is skipped for the rest of it.
    pub(crate) fn notify(&self, action: &Action, new_state: &StateValue, old_state: &StateValue) {
        let snapshot: Vec<ChangeListener> = self.entries.lock().clone();
        for listener in snapshot {
            if self.contains(&listener) {
                listener(action, new_state, old_state);
            }
        }
    }
}

impl Drop for SubscriberSet {
    fn drop(&mut self) {
        let remaining = self.entries.get_mut().len();
        if remaining > 0 {
            metrics::record_subscribers_removed(remaining);
        }
    }
}

/// Handle for removing a listener registered on a replica store.
///
/// Dropping the handle keeps the listener registered.
pub struct Subscription {
    set: Weak<SubscriberSet>,
    listener: ChangeListener,
}

impl Subscription {
    pub(crate) fn new(set: &Arc<SubscriberSet>, listener: ChangeListener) -> Self {
        Self {
            set: Arc::downgrade(set),
            listener,
        }
    }

    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.set
            .upgrade()
            .map(|set| set.remove(&self.listener))
            .unwrap_or(false)
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.set
            .upgrade()
            .map(|set| set.contains(&self.listener))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
