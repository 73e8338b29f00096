//! In-process fixed-window limiter. Counters live in memory, so every API
//! process enforces its own budget.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Windows are pruned once this many keys are tracked.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u64,
    pub window: Duration,
}

impl RateLimitRule {
    pub const fn per_minute(limit: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u64 },
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

struct Window {
    started: Instant,
    hits: u64,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self {
            started: now,
            hits: 0,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

/// Keys are caller scoped, e.g. `auth:<ip>` or `write:<user id>`.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a hit against `key`. Rejected hits are not counted.
    pub async fn check(&self, key: &str, rule: RateLimitRule) -> RateDecision {
        if rule.limit == 0 {
            return RateDecision::Limited {
                retry_after: rule.window,
            };
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|_, window| window.elapsed(now) < rule.window);
        }

        let window = windows
            .entry(key.to_owned())
            .or_insert_with(|| Window::fresh(now));
        if window.elapsed(now) >= rule.window {
            *window = Window::fresh(now);
        }

        if window.hits >= rule.limit {
            return RateDecision::Limited {
                retry_after: rule.window.saturating_sub(window.elapsed(now)),
            };
        }
        window.hits += 1;
        RateDecision::Allowed {
            remaining: rule.limit - window.hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn login_attempts_are_capped_per_window() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::per_minute(2);

        assert_eq!(
            limiter.check("auth:1.2.3.4", rule).await,
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check("auth:1.2.3.4", rule).await,
            RateDecision::Allowed { remaining: 0 }
        );
        let RateDecision::Limited { retry_after } = limiter.check("auth:1.2.3.4", rule).await
        else {
            panic!("third attempt should be limited");
        };
        assert!(retry_after <= rule.window);
    }

    #[tokio::test]
    async fn callers_have_separate_budgets() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::per_minute(1);

        assert!(limiter.check("write:u-1", rule).await.is_allowed());
        assert!(!limiter.check("write:u-1", rule).await.is_allowed());
        assert!(limiter.check("write:u-2", rule).await.is_allowed());
    }

    #[tokio::test]
    async fn zero_limit_blocks_for_a_full_window() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule {
            limit: 0,
            window: Duration::from_secs(5),
        };
        assert_eq!(
            limiter.check("k", rule).await,
            RateDecision::Limited {
                retry_after: Duration::from_secs(5)
            }
        );
    }

    #[tokio::test]
    async fn budget_refills_after_the_window() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule {
            limit: 1,
            window: Duration::from_millis(20),
        };

        assert!(limiter.check("k", rule).await.is_allowed());
        assert!(!limiter.check("k", rule).await.is_allowed());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("k", rule).await.is_allowed());
    }
}
