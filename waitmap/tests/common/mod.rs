#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};
use waitmap::WaitMap;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn key(s: &str) -> String {
    s.to_string()
}

/// Block until the map holds exactly `count` gates.
///
/// A reader creates its gate under the lock right before it parks, so once
/// the gate shows up the reader is registered and cannot miss a wake-up.
pub fn wait_for_gates<K, V>(map: &WaitMap<K, V>, count: usize) {
    let expected = format!("gates: {count} }}");
    let deadline = Instant::now() + Duration::from_secs(5);
    while !format!("{map:?}").ends_with(&expected) {
        assert!(
            Instant::now() < deadline,
            "gate count never reached {count}: {map:?}"
        );
        thread::sleep(Duration::from_millis(1));
    }
}
