//! Fuzz target for event message decoding.
//!
//! Whatever arrives on the channel, decoding either yields a message
//! or an error. A decoded message re-encodes to the same message.

#![no_main]

use libfuzzer_sys::fuzz_target;
use platform_replication::model::{EventKind, ReplicationMessage};

fuzz_target!(|data: &str| {
    if let Ok(message) = serde_json::from_str::<ReplicationMessage>(data) {
        let _ = EventKind::parse(&message.event);
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: ReplicationMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, message);
    }
});
