//! Timing utilities
//!
//! This module provides a small timer used around statement execution so
//! slow queries surface in the logs together with their SQL text.

use std::time::{Duration, Instant};

use log::{debug, warn};

/// Timer wrapped around one statement execution
#[derive(Debug)]
pub struct QueryTimer {
    /// Start time
    start: Instant,

    /// Executions slower than this are logged at warn level
    warn_after: Duration,
}

impl QueryTimer {
    /// Start a timer with the given warn threshold in milliseconds
    pub fn new(warn_after_ms: u64) -> Self {
        QueryTimer {
            start: Instant::now(),
            warn_after: Duration::from_millis(warn_after_ms),
        }
    }

    /// Elapsed time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Finish timing the statement, logging it at warn level when it ran
    /// past the threshold and at debug level otherwise
    pub fn finish(self, sql: &str) {
        let elapsed = self.elapsed();
        if elapsed > self.warn_after {
            warn!("slow statement ({}ms): {}", elapsed.as_millis(), sql);
        } else {
            debug!("statement ok ({}ms): {}", elapsed.as_millis(), sql);
        }
    }
}
