use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces consecutive provider requests by a fixed pause.
///
/// The first request passes immediately; each later one waits until
/// `pause` has elapsed since the previous permit. A zero pause disables
/// pacing.
#[derive(Clone)]
pub struct Pacer {
    limiter: Option<Arc<DirectRateLimiter>>,
    pause: Duration,
}

impl Pacer {
    pub fn new(pause: Duration) -> Self {
        Self {
            limiter: Quota::with_period(pause).map(|quota| Arc::new(RateLimiter::direct(quota))),
            pause,
        }
    }

    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO)
    }

    pub const fn pause(&self) -> Duration {
        self.pause
    }

    /// Wait for the next request slot.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("pause", &self.pause).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn spaces_requests_by_the_pause() {
        let pacer = Pacer::new(Duration::from_millis(40));
        let started = Instant::now();

        pacer.ready().await;
        pacer.ready().await;
        pacer.ready().await;

        assert!(started.elapsed() >= Duration::from_millis(75));
    }

    #[tokio::test]
    async fn zero_pause_never_waits() {
        let pacer = Pacer::unpaced();
        let started = Instant::now();

        for _ in 0..100 {
            pacer.ready().await;
        }

        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(pacer.pause(), Duration::ZERO);
    }
}
