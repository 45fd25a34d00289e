//! Fuzz target for diff and reconcile.
//!
//! Tests that reconciling the diff of two arbitrary documents reproduces the
//! second one and never mutates the first.

#![no_main]

use libfuzzer_sys::fuzz_target;
use state_replication::{changed_paths, compare, reconcile, StateValue};

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;
    let (Ok(a), Ok(b)) = (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) else {
        return;
    };

    let old = StateValue::from(a.clone());
    let new = StateValue::from(b);

    let patch = compare(&old, &new);
    let paths = changed_paths(&patch);
    let result = reconcile(&old, paths.as_deref(), &patch).expect("own diff applies");

    assert_eq!(result, new);
    assert_eq!(old.to_json(), a);
});
