//! Fuzz target for protocol event decoding.
//!
//! Arbitrary bytes that parse as JSON must decode to an event, be ignored as
//! foreign, or fail with an error. Never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use state_replication::{changed_paths, reconcile, ProtocolEvent, StateValue};

fuzz_target!(|data: &[u8]| {
    let Ok(message) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    // Should never panic
    let Ok(Some(event)) = ProtocolEvent::decode(&message) else {
        return;
    };

    // Whatever decoded must encode again
    let encoded = event.to_message().expect("decoded event encodes");
    assert_eq!(encoded["type"], message["type"]);

    // Applying a decoded patch to an empty mirror may fail but must not panic
    if let ProtocolEvent::ActionProcessed(processed) = event {
        if let Some((paths, patch)) = processed.changes() {
            let _ = reconcile(&StateValue::object(), Some(paths), patch);
            let _ = changed_paths(patch);
        }
    }
});
