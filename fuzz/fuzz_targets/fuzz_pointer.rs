//! Fuzz target for JSON pointer handling.
//!
//! Tests that segment escaping round-trips and that pointer writes never
//! panic or touch the original snapshot.

#![no_main]

use libfuzzer_sys::fuzz_target;
use state_replication::patch::{join_pointer, pointer_segments};
use state_replication::StateValue;

fuzz_target!(|data: (&str, &str, i64)| {
    let (a, b, n) = data;

    // Escape then split gives back the original segments
    let segments = vec![a.to_string(), b.to_string()];
    let pointer = join_pointer(&segments);
    assert_eq!(pointer_segments(&pointer), segments);

    // Writes through arbitrary pointers may fail but never mutate the source
    let original = StateValue::from(serde_json::json!({"a": {"b": [1, 2]}, "x": "y"}));
    let snapshot = original.to_json();
    let mut next = original.clone();
    let _ = next.set_pointer(a, n);
    let _ = next.remove_pointer(b);
    assert_eq!(original.to_json(), snapshot);
});
