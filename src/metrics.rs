// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Events posted and received per side
//! - Messages dropped (foreign or malformed)
//! - Handshake outcomes and latency
//! - Origin reduce/diff cost and patch sizes
//! - Replica reconciliation outcomes
//! - Subscriber count and protocol state
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `state_replication_` and follow Prometheus
//! conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use state_replication::metrics;
//! use state_replication::transport::Role;
//! use std::time::Duration;
//!
//! metrics::record_message_dropped(Role::Replica, "foreign");
//! metrics::record_reconcile(true, Duration::from_micros(40));
//! ```

use crate::event::EventKind;
use crate::transport::Role;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

// =============================================================================
// Channel Traffic
// =============================================================================

/// Record a protocol event posted on a port.
pub fn record_event_sent(side: Role, kind: EventKind) {
    counter!(
        "state_replication_events_sent_total",
        "side" => side.as_str(),
        "event" => kind.label()
    )
    .increment(1);
}

/// Record a protocol event decoded from a port.
pub fn record_event_received(side: Role, kind: EventKind) {
    counter!(
        "state_replication_events_received_total",
        "side" => side.as_str(),
        "event" => kind.label()
    )
    .increment(1);
}

/// Record a message that was not handled (`foreign`, `malformed`, `unexpected`).
pub fn record_message_dropped(side: Role, reason: &'static str) {
    counter!(
        "state_replication_messages_dropped_total",
        "side" => side.as_str(),
        "reason" => reason
    )
    .increment(1);
}

// =============================================================================
// Handshake Metrics
// =============================================================================

/// Record a handshake wait outcome (`ok`, `timeout`, `closed`, `malformed`).
pub fn record_handshake(kind: EventKind, outcome: &'static str, duration: Duration) {
    counter!(
        "state_replication_handshakes_total",
        "event" => kind.label(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("state_replication_handshake_duration_seconds", "event" => kind.label())
        .record(duration.as_secs_f64());
}

// =============================================================================
// Origin Metrics
// =============================================================================

/// Record one reduced action on origin with its diff stats.
pub fn record_action_processed(patch_ops: usize, changed_paths: usize, duration: Duration) {
    let outcome = if patch_ops == 0 { "noop" } else { "changed" };
    counter!("state_replication_actions_processed_total", "outcome" => outcome).increment(1);

    if patch_ops > 0 {
        histogram!("state_replication_patch_ops").record(patch_ops as f64);
        histogram!("state_replication_changed_paths").record(changed_paths as f64);
    }

    histogram!("state_replication_process_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Replica Metrics
// =============================================================================

/// Record a reconciliation attempt on the replica.
pub fn record_reconcile(success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("state_replication_reconciles_total", "status" => status).increment(1);
    histogram!("state_replication_reconcile_duration_seconds").record(duration.as_secs_f64());
}

/// Record a processed action that left the replica state untouched.
pub fn record_noop_applied() {
    counter!("state_replication_noop_actions_total").increment(1);
}

/// Track change listeners registered across every replica in the process.
///
/// Stores only ever report deltas, so several replicas can share the gauge.
pub fn record_subscribers_added(count: usize) {
    gauge!("state_replication_subscribers").increment(count as f64);
}

/// Counterpart of [`record_subscribers_added`].
pub fn record_subscribers_removed(count: usize) {
    gauge!("state_replication_subscribers").decrement(count as f64);
}

/// Gauge for the protocol state of one side.
pub fn set_protocol_state(side: Role, state: &str) {
    // Encode state as numeric for alerting
    let value = match state {
        "Uninitialized" => 0.0,
        "AwaitingInitialState" => 1.0,
        "Ready" => 2.0,
        "Steady" => 3.0,
        _ => -1.0,
    };
    gauge!("state_replication_protocol_state", "side" => side.as_str()).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The metrics crate uses global state. Without a recorder installed these
    // calls are no-ops; the tests check they accept every input shape.

    #[test]
    fn test_record_event_traffic() {
        for kind in EventKind::ALL {
            record_event_sent(Role::Replica, kind);
            record_event_received(Role::Origin, kind);
        }
    }

    #[test]
    fn test_record_message_dropped() {
        record_message_dropped(Role::Replica, "foreign");
        record_message_dropped(Role::Origin, "malformed");
        record_message_dropped(Role::Origin, "unexpected");
    }

    #[test]
    fn test_record_handshake() {
        record_handshake(EventKind::InitialState, "ok", Duration::from_millis(3));
        record_handshake(EventKind::Ready, "timeout", Duration::from_secs(60));
        record_handshake(EventKind::InitialStateRequest, "closed", Duration::ZERO);
    }

    #[test]
    fn test_record_action_processed() {
        record_action_processed(0, 0, Duration::from_micros(10));
        record_action_processed(3, 2, Duration::from_micros(80));
    }

    #[test]
    fn test_record_reconcile() {
        record_reconcile(true, Duration::from_micros(25));
        record_reconcile(false, Duration::ZERO);
        record_noop_applied();
    }

    #[test]
    fn test_gauges() {
        record_subscribers_added(3);
        record_subscribers_removed(3);
        for state in ["Uninitialized", "AwaitingInitialState", "Ready", "Steady", "bogus"] {
            set_protocol_state(Role::Replica, state);
        }
    }
}
