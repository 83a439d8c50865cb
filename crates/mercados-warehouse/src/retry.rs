//! Bounded retry with a fixed pause between attempts.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::warn;

/// Retry policy for operations that either succeed quickly or not at all,
/// such as opening the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between two consecutive attempts.
    pub delay: Duration,
}

/// The last error seen once every attempt has failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// Create a policy with a fixed delay.
    #[must_use]
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based), or `None`
    /// when it was the last one.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// The closure receives the 1-based attempt number.
    ///
    /// # Errors
    /// Returns the last error together with the number of attempts made.
    pub fn run<T, E: Display>(
        &self,
        what: &str,
        mut operation: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, RetryExhausted<E>> {
        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => match self.delay_after(attempt) {
                    Some(delay) => {
                        warn!(
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            %error,
                            "{what} failed, retrying"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                    }
                    None => {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: error,
                        })
                    }
                },
            }
        }
    }
}
