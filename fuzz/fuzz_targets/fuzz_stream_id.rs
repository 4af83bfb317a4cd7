//! Fuzz target for entry id comparison.
//!
//! Comparison must never panic on arbitrary input and must stay
//! antisymmetric, since the subscriber orders pending entries with it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use platform_replication::channel::compare_stream_ids;
use std::cmp::Ordering;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;

    let ab = compare_stream_ids(a, b);
    let ba = compare_stream_ids(b, a);
    assert_eq!(ab, ba.reverse());

    assert_eq!(compare_stream_ids(a, a), Ordering::Equal);
});
