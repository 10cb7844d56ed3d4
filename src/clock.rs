use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Time source for every sleep and log timestamp in a run.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created.
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by tokio timers.
pub struct TokioClock {
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock whose sleeps return immediately and advance virtual time instead.
#[derive(Default)]
pub struct VirtualClock {
    elapsed_nanos: AtomicU64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Sleep `interval`, then ask `predicate`; repeat up to `max_attempts` times.
///
/// Returns the first `Some` the predicate yields, or `None` once the attempts
/// are exhausted. The predicate receives the 1-based attempt number.
pub async fn poll_until<T, F, Fut>(
    clock: &dyn Clock,
    interval: Duration,
    max_attempts: u32,
    mut predicate: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=max_attempts {
        clock.sleep(interval).await;
        if let Some(value) = predicate(attempt).await {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_virtual_clock_sleep_advances_time() {
        let clock = VirtualClock::new();
        clock.sleep(Duration::from_secs(8)).await;
        clock.sleep(Duration::from_millis(500)).await;
        assert_eq!(clock.elapsed(), Duration::from_millis(8500));
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_first_hit() {
        let clock = VirtualClock::new();
        let mut calls = 0;
        let hit = poll_until(&clock, Duration::from_secs(2), 60, |attempt| {
            calls += 1;
            async move { (attempt == 3).then_some(attempt) }
        })
        .await;

        assert_eq!(hit, Some(3));
        assert_eq!(calls, 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_poll_until_exhausts_attempts() {
        let clock = VirtualClock::new();
        let hit: Option<()> =
            poll_until(&clock, Duration::from_secs(2), 60, |_| async { None }).await;

        assert!(hit.is_none());
        assert_eq!(clock.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_poll_until_zero_attempts_never_calls() {
        let clock = VirtualClock::new();
        let mut calls = 0;
        let hit: Option<()> = poll_until(&clock, Duration::from_secs(2), 0, |_| {
            calls += 1;
            async { None }
        })
        .await;
        assert!(hit.is_none());
        assert_eq!(calls, 0);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
