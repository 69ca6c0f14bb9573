use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, Duration, Instant};

/// Enforces the per-provider minimum interval between requests (spec
/// §4.3: ≥200 ms primary, ≥500 ms fallback), independent of which run
/// issued the call (spec §5 — the rate-limit state is shared and must
/// be mutex-protected).
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<Instant>>,
    min_delay: Duration,
}

impl RateLimiter {
    /// `max_concurrent` bounds in-flight requests; `min_interval` is
    /// the minimum gap enforced between consecutive requests.
    pub fn new(max_concurrent: usize, min_interval: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            last_request: Arc::new(Mutex::new(Instant::now() - min_interval)),
            min_delay: min_interval,
        }
    }

    pub async fn acquire(&self) -> RateLimitGuard {
        let permit = self.semaphore.clone().acquire_owned().await.unwrap();

        let wait_time = {
            let last = self.last_request.lock();
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                Some(self.min_delay - elapsed)
            } else {
                None
            }
        };

        if let Some(delay) = wait_time {
            sleep(delay).await;
        }

        *self.last_request.lock() = Instant::now();

        RateLimitGuard { _permit: permit }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

pub struct RateLimitGuard {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn enforces_minimum_delay_between_requests() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));

        let start = StdInstant::now();
        let guard1 = limiter.acquire().await;
        assert!(start.elapsed().as_millis() < 100);
        drop(guard1);

        let _guard2 = limiter.acquire().await;
        assert!(start.elapsed().as_millis() >= 180);
    }
}
