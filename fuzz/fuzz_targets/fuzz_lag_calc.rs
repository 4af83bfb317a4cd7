//! Fuzz target for replication lag calculation.
//!
//! `calculate_lag_ms`, `entry_age_ms` and `parse_stream_id_timestamp`
//! must never panic on arbitrary entry ids.

#![no_main]

use libfuzzer_sys::fuzz_target;
use platform_replication::channel::{calculate_lag_ms, entry_age_ms, parse_stream_id_timestamp};

fuzz_target!(|data: (&str, &str)| {
    let (cursor, latest) = data;

    let _ = parse_stream_id_timestamp(cursor);
    let _ = parse_stream_id_timestamp(latest);
    let _ = entry_age_ms(latest);

    if let Some(lag) = calculate_lag_ms(cursor, latest) {
        let latest_ts = parse_stream_id_timestamp(latest).unwrap();
        assert!(lag <= latest_ts);
    }
});
