use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Fixed-interval request pacer.
///
/// Each call to [`acquire`](Self::acquire) is assigned the next free slot on a
/// grid spaced `1/qps` apart, so N calls complete no sooner than `(N - 1) / qps`
/// seconds after the first. Slots are handed out under a lock; the wait itself
/// happens outside it, so concurrent callers queue without blocking each other.
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `qps` requests per second. Zero disables pacing.
    pub fn per_second(qps: u32) -> Self {
        let interval = if qps == 0 {
            None
        } else {
            Some(Duration::from_secs(1) / qps)
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Create a limiter that never waits.
    pub const fn unlimited() -> Self {
        Self {
            interval: None,
            next_slot: Mutex::new(None),
        }
    }

    /// The spacing between slots, or `None` when pacing is disabled.
    pub const fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until the next request slot is available.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let scheduled = {
            let mut slot = self
                .next_slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let scheduled = slot.map_or(now, |s| s.max(now));
            *slot = Some(scheduled + interval);
            scheduled
        };

        let now = Instant::now();
        if scheduled > now {
            tokio::time::sleep(scheduled - now).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_qps_disables_pacing() {
        assert!(RateLimiter::per_second(0).interval().is_none());
        assert!(RateLimiter::unlimited().interval().is_none());
        assert_eq!(
            RateLimiter::per_second(4).interval(),
            Some(Duration::from_millis(250))
        );
    }

    #[tokio::test]
    async fn test_sequential_spacing() {
        let limiter = RateLimiter::per_second(50);
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        // 4 slots at 20ms spacing: at least 60ms between first and last
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_concurrent_spacing() {
        let limiter = Arc::new(RateLimiter::per_second(50));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        let span = *times.last().unwrap() - *times.first().unwrap();
        assert!(span >= Duration::from_millis(60), "span was {span:?}");
    }

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = RateLimiter::unlimited();
        let start = Instant::now();
        for _ in 0..10 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
