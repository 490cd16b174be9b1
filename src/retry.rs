//! Fixed-delay retry for store operations
//!
//! Only transient errors are retried; everything else returns immediately.

use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;

/// Attempt count plus a constant pause between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.retry_attempts, config.retry_delay)
    }

    /// Run `f` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Transient store error, retrying"
                    );
                    thread::sleep(self.delay);
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
