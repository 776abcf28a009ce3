//! Randomized inter-request delay.
//!
//! Each worker owns its own [`Throttle`]; there is no global token bucket, so
//! the aggregate request rate grows with the number of running workers.

use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Sleeps a uniformly random duration in `[min, max]` before an outbound call.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    min: Duration,
    max: Duration,
}

impl Throttle {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A throttle that never sleeps (tests, local mirrors).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Draw the next delay.
    pub fn next_delay(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if min == max {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Sleep for a freshly drawn delay.
    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!(delay_ms = delay.as_millis() as u64, "throttling before request");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let throttle = Throttle::new(Duration::from_millis(20), Duration::from_millis(50));
        for _ in 0..200 {
            let d = throttle.next_delay();
            assert!(d >= Duration::from_millis(20) && d <= Duration::from_millis(50));
        }
    }

    #[test]
    fn inverted_bounds_are_swapped() {
        let throttle = Throttle::new(Duration::from_millis(90), Duration::from_millis(10));
        let d = throttle.next_delay();
        assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn disabled_throttle_returns_immediately() {
        let start = std::time::Instant::now();
        Throttle::disabled().wait().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
