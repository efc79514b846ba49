use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

/// Per-user sliding-window rate limiter.
///
/// Tracks request timestamps per user and enforces a maximum number of
/// actions within a given window. In-memory; production deployments can
/// swap in a shared backend behind the same surface.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Vec<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps older than the window, then either record the
    /// current request and allow it, or deny with a retry hint of
    /// `(oldest_in_window - window_start) + 1` seconds.
    pub fn is_allowed(
        &self,
        user_id: &str,
        limit: usize,
        window_seconds: i64,
    ) -> RateLimitDecision {
        let now = Utc::now();
        let window_start = now - Duration::seconds(window_seconds);

        let mut entry = self.windows.entry(user_id.to_string()).or_default();
        entry.retain(|ts| *ts > window_start);

        if entry.len() < limit {
            entry.push(now);
            return RateLimitDecision::Allowed;
        }

        let oldest = entry[0];
        let retry_after = (oldest - window_start).num_seconds().max(0) as u64 + 1;
        RateLimitDecision::Limited {
            retry_after_seconds: retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new();
        for _ in 0..5 {
            assert_eq!(
                limiter.is_allowed("alice", 5, 3600),
                RateLimitDecision::Allowed
            );
        }
        match limiter.is_allowed("alice", 5, 3600) {
            RateLimitDecision::Limited {
                retry_after_seconds,
            } => assert!(retry_after_seconds >= 1),
            RateLimitDecision::Allowed => panic!("sixth request should be limited"),
        }
    }

    #[test]
    fn users_are_isolated() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.is_allowed("a", 1, 3600), RateLimitDecision::Allowed);
        assert!(matches!(
            limiter.is_allowed("a", 1, 3600),
            RateLimitDecision::Limited { .. }
        ));
        assert_eq!(limiter.is_allowed("b", 1, 3600), RateLimitDecision::Allowed);
    }

    #[test]
    fn expired_entries_fall_out_of_window() {
        let limiter = RateLimiter::new();
        // Zero-length window: previous entries expire immediately.
        assert_eq!(limiter.is_allowed("c", 1, 0), RateLimitDecision::Allowed);
        assert_eq!(limiter.is_allowed("c", 1, 0), RateLimitDecision::Allowed);
    }
}
