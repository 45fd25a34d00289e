// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - A recording fake MessagePort
//! - State and event builders
//! - Tracing setup for `--nocapture` runs

#![allow(dead_code)]

pub mod fake_port;

pub use fake_port::*;

use serde_json::Value;
use state_replication::{Action, StateValue};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn state(value: Value) -> StateValue {
    StateValue::from(value)
}

/// Reducer used across the integration tests.
///
/// - `inc`: bump `/count`
/// - `set`: write `value` at pointer `path`
/// - `remove`: remove pointer `path`
/// - `push`: append `value` to the array at `path`
/// - anything else: no change
pub fn test_reducer(state: &StateValue, action: &Action) -> StateValue {
    let mut next = state.clone();
    let path = action.get("path").and_then(Value::as_str).unwrap_or("");
    let value = action.get("value").cloned().unwrap_or(Value::Null);

    let result = match action.kind.as_str() {
        "inc" => {
            let count = state.pointer("/count").and_then(StateValue::as_i64).unwrap_or(0);
            next.set_pointer("/count", count + 1)
        }
        "set" => next.set_pointer(path, StateValue::from(value)),
        "remove" => next.remove_pointer(path),
        "push" => next.set_pointer(&format!("{path}/-"), StateValue::from(value)),
        _ => Ok(()),
    };

    match result {
        Ok(()) => next,
        Err(_) => state.clone(),
    }
}

pub fn set_action(path: &str, value: Value) -> Action {
    Action::new("set").with("path", path).with("value", value)
}
