// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Debugging observer hookup.
//!
//! An observer sees the replica's state once at construction and again after
//! every processed action. Hosts plug in their own tooling through
//! [`ObserverConnector`]; the crate ships [`TracingObserverConnector`], which
//! writes both to `tracing`.

use crate::config::ObserverOptions;
use crate::event::Action;
use crate::value::StateValue;
use std::sync::Arc;
use tracing::{debug, info};

/// Receives `(action, state)` pairs from a replica store.
pub trait StateObserver: Send + Sync + 'static {
    /// Called once with the store's initial state.
    fn init(&self, state: &StateValue);

    /// Called after every processed action, no-ops included.
    fn send(&self, action: &Action, state: &StateValue);
}

/// Creates observers from configured options.
pub trait ObserverConnector: Send + Sync + 'static {
    /// Connect an observer, or `None` if the tooling is not available.
    fn connect(&self, options: &ObserverOptions) -> Option<Arc<dyn StateObserver>>;
}

/// Observer that logs through `tracing`.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    name: String,
    include_state: bool,
}

impl TracingObserver {
    pub fn new(options: &ObserverOptions) -> Self {
        Self {
            name: options.name.clone().unwrap_or_else(|| "replica".to_string()),
            include_state: options.include_state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl StateObserver for TracingObserver {
    fn init(&self, state: &StateValue) {
        if self.include_state {
            info!(observer = %self.name, state = %state.to_json(), "Observer attached");
        } else {
            info!(observer = %self.name, "Observer attached");
        }
    }

    fn send(&self, action: &Action, state: &StateValue) {
        if self.include_state {
            debug!(observer = %self.name, action = %action.kind, state = %state.to_json(), "Action observed");
        } else {
            debug!(observer = %self.name, action = %action.kind, "Action observed");
        }
    }
}

/// Connector producing [`TracingObserver`]s. Always available.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserverConnector;

impl ObserverConnector for TracingObserverConnector {
    fn connect(&self, options: &ObserverOptions) -> Option<Arc<dyn StateObserver>> {
        Some(Arc::new(TracingObserver::new(options)))
    }
}
