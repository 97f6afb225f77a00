/*!
 * Test Helpers
 * Stage tracking for coordinating worker threads in timing tests
 */

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const NOT_STARTED: u8 = 0;
pub const WAITING: u8 = 1;
pub const DONE: u8 = 2;

/// Shared progress marker for a worker thread.
///
/// Workers publish where they are; the test thread polls for a stage or
/// asserts the worker stays in one while events that must not wake it
/// happen.
#[derive(Clone)]
pub struct Stage(Arc<AtomicU8>);

impl Stage {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(NOT_STARTED)))
    }

    pub fn set(&self, stage: u8) {
        self.0.store(stage, Ordering::SeqCst);
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    /// Poll until the worker reaches `desired` or `timeout` elapses
    pub fn wait_for(&self, desired: u8, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.get() != desired && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        self.get() == desired
    }

    /// True if the worker is still in `desired` after `hold` has passed
    pub fn remains_in(&self, desired: u8, hold: Duration) -> bool {
        std::thread::sleep(hold);
        self.get() == desired
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}
