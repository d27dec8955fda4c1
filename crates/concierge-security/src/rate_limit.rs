use concierge_core::{ConciergeError, ConciergeResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Length of the trailing window requests are counted over.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Rate limit settings, supplied once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per tenant per minute. `0` means unlimited.
    #[serde(default)]
    pub limit_per_minute: u32,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// In-window requests for the tenant. Includes the new request when
    /// admitted.
    pub current_count: usize,
    /// Effective cap; `0` means unlimited.
    pub limit: u32,
    /// Seconds until the oldest in-window request expires. Only set on denial.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            current_count: 0,
            limit: 0,
            retry_after_secs: None,
        }
    }

    /// Converts a denial into [`ConciergeError::RateLimited`].
    pub fn into_result(self) -> ConciergeResult<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(ConciergeError::RateLimited {
                retry_after_secs: self.retry_after_secs.unwrap_or(1),
            })
        }
    }
}

/// Sliding-window rate limiter keyed by tenant id.
///
/// Each tenant keeps the timestamps of its admitted requests from the last
/// [`WINDOW`]. Stale timestamps are dropped lazily when the tenant is next
/// checked, and a tenant whose window empties is removed from the table, so
/// idle tenants cost nothing.
pub struct RateLimiter {
    limit: u32,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit_per_minute` requests per tenant.
    /// A limit of `0` disables limiting entirely.
    pub fn new(limit_per_minute: u32) -> Self {
        Self {
            limit: limit_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Create a limiter from its configuration section.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit_per_minute)
    }

    /// The configured cap; `0` means unlimited.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Decide whether `tenant_id` may make another request now.
    pub fn check(&self, tenant_id: &str) -> RateLimitDecision {
        self.check_at(tenant_id, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    ///
    /// `now` must not go backwards between calls for the same tenant.
    pub fn check_at(&self, tenant_id: &str, now: Instant) -> RateLimitDecision {
        if self.limit == 0 {
            return RateLimitDecision::unlimited();
        }

        let mut windows = self.windows.lock();

        let in_window = windows
            .get_mut(tenant_id)
            .map(|stamps| {
                prune(stamps, now);
                stamps.len()
            })
            .unwrap_or(0);
        if in_window == 0 {
            windows.remove(tenant_id);
        }

        if in_window >= self.limit as usize {
            let oldest = windows
                .get(tenant_id)
                .and_then(|stamps| stamps.front().copied())
                .unwrap_or(now);
            let retry_after_secs = retry_after(oldest, now);
            warn!(
                tenant = %tenant_id,
                count = in_window,
                limit = self.limit,
                retry_after_secs,
                "Rate limited request"
            );
            return RateLimitDecision {
                allowed: false,
                current_count: in_window,
                limit: self.limit,
                retry_after_secs: Some(retry_after_secs),
            };
        }

        windows
            .entry(tenant_id.to_string())
            .or_default()
            .push_back(now);

        debug!(tenant = %tenant_id, count = in_window + 1, limit = self.limit, "Request admitted");
        RateLimitDecision {
            allowed: true,
            current_count: in_window + 1,
            limit: self.limit,
            retry_after_secs: None,
        }
    }

    /// Number of tenants with at least one timestamp stored.
    pub fn tracked_tenants(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Drop timestamps that have aged out. A timestamp exactly [`WINDOW`] old is
/// out.
fn prune(stamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) >= WINDOW {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

/// Whole seconds until `oldest` leaves the window, rounded up, at least 1.
fn retry_after(oldest: Instant, now: Instant) -> u64 {
    let remaining = (oldest + WINDOW).saturating_duration_since(now);
    let secs = remaining.as_millis().div_ceil(1000);
    u64::try_from(secs).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_admits_without_bookkeeping() {
        let limiter = RateLimiter::new(0);
        let now = Instant::now();
        for _ in 0..100 {
            let d = limiter.check_at("t1", now);
            assert!(d.allowed);
            assert_eq!(d.current_count, 0);
            assert_eq!(d.limit, 0);
            assert!(d.retry_after_secs.is_none());
        }
        assert_eq!(limiter.tracked_tenants(), 0);
    }

    #[test]
    fn test_rate_limiter_blocks() {
        let limiter = RateLimiter::new(2);
        let now = Instant::now();
        assert!(limiter.check_at("t1", now).allowed);
        assert!(limiter.check_at("t1", now).allowed);

        let denied = limiter.check_at("t1", now);
        assert!(!denied.allowed);
        assert_eq!(denied.current_count, 2);
        assert_eq!(denied.retry_after_secs, Some(60));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("t1", start).allowed);

        let d = limiter.check_at("t1", start + Duration::from_millis(58_500));
        assert_eq!(d.retry_after_secs, Some(2));

        let d = limiter.check_at("t1", start + Duration::from_millis(59_999));
        assert_eq!(d.retry_after_secs, Some(1));
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("t1", start).allowed);
        assert!(!limiter.check_at("t1", start + WINDOW - Duration::from_millis(1)).allowed);

        let d = limiter.check_at("t1", start + WINDOW);
        assert!(d.allowed);
        assert_eq!(d.current_count, 1);
    }

    #[test]
    fn test_denial_does_not_record() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("t1", start).allowed);
        for i in 1..10 {
            let d = limiter.check_at("t1", start + Duration::from_secs(i));
            assert!(!d.allowed);
            assert_eq!(d.current_count, 1);
        }
        assert!(limiter.check_at("t1", start + WINDOW).allowed);
    }

    #[test]
    fn test_idle_tenant_entry_removed_on_check() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        limiter.check_at("t1", start);
        limiter.check_at("t2", start);
        assert_eq!(limiter.tracked_tenants(), 2);

        // t1 comes back after its window emptied: entry is dropped, then a
        // fresh one is created for the new request.
        let d = limiter.check_at("t1", start + WINDOW * 2);
        assert_eq!(d.current_count, 1);
        assert_eq!(limiter.tracked_tenants(), 2);
    }

    #[test]
    fn test_into_result() {
        let limiter = RateLimiter::new(1);
        let now = Instant::now();
        assert!(limiter.check_at("t1", now).into_result().is_ok());
        match limiter.check_at("t1", now).into_result() {
            Err(ConciergeError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 60);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_config_defaults_to_unlimited() {
        let config: RateLimitConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.limit_per_minute, 0);
        assert_eq!(RateLimiter::from_config(&config).limit(), 0);
    }
}
