use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::config::LimiterConfig;
use crate::error::{CollectError, CollectResult};

/// Upstream request classes, each shaped by its own limiter.
///
/// - Storefront: heavier API (app details, localized announcements)
/// - PublicStats: lighter API (announcement feed, player counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Storefront,
    PublicStats,
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Burst-then-steady limiter for one request class.
///
/// One cell is replenished every `interval`, up to `burst` cells. The
/// limiter starts full.
///
/// GUARANTEES:
/// - Within any window of one `interval`, at most `burst` acquisitions
///   return without waiting, however long the limiter sat idle before.
/// - Waiting suspends the calling task only.
pub struct ClassLimiter {
    limiter: DirectRateLimiter,
}

impl ClassLimiter {
    /// A zero `burst` or `interval` is rejected by config validation;
    /// here they fall back to the tightest quota governor accepts.
    pub fn new(burst: u32, interval: Duration) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self { limiter: RateLimiter::direct(quota) }
    }

    /// Waits for one cell.
    ///
    /// Returns `Cancelled` as soon as `cancel` fires, including when it
    /// already fired before the call, so a cancelled task never issues
    /// another upstream request.
    pub async fn acquire(&self, cancel: &CancellationToken) -> CollectResult<()> {
        if cancel.is_cancelled() {
            return Err(CollectError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CollectError::Cancelled),
            _ = self.limiter.until_ready() => Ok(()),
        }
    }
}

/// The two limiters shared by every task of every cycle.
pub struct RateLimiters {
    storefront: ClassLimiter,
    public_stats: ClassLimiter,
}

impl RateLimiters {
    pub fn new(cfg: &LimiterConfig) -> Self {
        Self {
            storefront: ClassLimiter::new(cfg.burst, Duration::from_secs(cfg.storefront_secs)),
            public_stats: ClassLimiter::new(cfg.burst, Duration::from_secs(cfg.public_stats_secs)),
        }
    }

    pub async fn acquire(&self, class: RequestClass, cancel: &CancellationToken) -> CollectResult<()> {
        match class {
            RequestClass::Storefront => self.storefront.acquire(cancel).await,
            RequestClass::PublicStats => self.public_stats.acquire(cancel).await,
        }
    }
}
