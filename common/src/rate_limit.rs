// Send pacing for the delivery provider's throughput limit

use crate::config::{PacingConfig, PacingMode};
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Waits until the next send is allowed
#[async_trait]
pub trait SendPacer: Send + Sync {
    async fn ready(&self);
}

/// No pacing at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

#[async_trait]
impl SendPacer for NoPacing {
    async fn ready(&self) {}
}

/// Fixed minimum gap between consecutive sends
#[derive(Debug)]
pub struct FixedDelay {
    delay: Duration,
    last_send: Mutex<Option<Instant>>,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_send: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SendPacer for FixedDelay {
    async fn ready(&self) {
        let mut last_send = self.last_send.lock().await;
        if let Some(previous) = *last_send {
            sleep_until(previous + self.delay).await;
        }
        *last_send = Some(Instant::now());
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Token bucket allowing `per_second` sends with bursts up to `burst`
pub struct TokenBucketPacer {
    limiter: DirectLimiter,
}

impl std::fmt::Debug for TokenBucketPacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketPacer")
            .field("limiter", &"<RateLimiter>")
            .finish()
    }
}

impl TokenBucketPacer {
    pub fn new(per_second: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_second(per_second).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }
}

#[async_trait]
impl SendPacer for TokenBucketPacer {
    async fn ready(&self) {
        self.limiter.until_ready().await;
    }
}

/// Build the pacer described by configuration
pub fn pacer_from_config(config: &PacingConfig) -> Arc<dyn SendPacer> {
    match config.mode {
        PacingMode::None => Arc::new(NoPacing),
        PacingMode::Fixed => Arc::new(FixedDelay::new(Duration::from_millis(config.delay_ms))),
        PacingMode::TokenBucket => {
            let per_second = NonZeroU32::new(config.per_second).unwrap_or(NonZeroU32::MIN);
            let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
            Arc::new(TokenBucketPacer::new(per_second, burst))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_pacing_returns_immediately() {
        let started = std::time::Instant::now();
        for _ in 0..100 {
            NoPacing.ready().await;
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_spaces_sends() {
        let pacer = FixedDelay::new(Duration::from_millis(200));
        let started = Instant::now();
        pacer.ready().await;
        assert!(started.elapsed() < Duration::from_millis(200));
        pacer.ready().await;
        pacer.ready().await;
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_token_bucket_allows_burst() {
        let pacer = TokenBucketPacer::new(
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(3).unwrap(),
        );
        let started = std::time::Instant::now();
        for _ in 0..3 {
            pacer.ready().await;
        }
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_token_bucket_throttles_past_burst() {
        let pacer = TokenBucketPacer::new(
            NonZeroU32::new(20).unwrap(),
            NonZeroU32::new(1).unwrap(),
        );
        let started = std::time::Instant::now();
        for _ in 0..3 {
            pacer.ready().await;
        }
        // Two waits of ~50ms each after the first token
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn test_pacer_from_config_accepts_zero_rates() {
        let config = PacingConfig {
            mode: PacingMode::TokenBucket,
            delay_ms: 0,
            per_second: 0,
            burst: 0,
        };
        // Falls back to one send per second instead of panicking
        let _pacer = pacer_from_config(&config);
    }
}
