//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod mock_helpers;

use std::time::{Duration, Instant};
use tribodaq_rs::config::AppConfig;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Poll `condition` until it holds or the test timeout passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Config that saves run data under `dir` with a small live buffer
pub fn config_in(dir: &std::path::Path, live_capacity: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.serial.port = "scripted".to_string();
    config.data.save_directory = dir.to_path_buf();
    config.data.live_buffer_capacity = live_capacity;
    config.data.flush_every_rows = 8;
    config
}
