//! In-memory per-IP rate limiting for the token relay.
//!
//! Sliding-window counters backed by `HashMap<IpAddr, VecDeque<Instant>>`.
//! One limit enforced: 100 relay requests per IP per 15 minutes, both
//! tunable from the environment. A linear prune per request is fine at
//! this scale; the map is swept whenever a client's window empties.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_MAX_REQUESTS: usize = 100;
const DEFAULT_WINDOW_SECS: u64 = 900;

#[derive(Clone, Copy)]
struct RateLimitConfig {
    max_requests: usize,
    window: Duration,
}

impl RateLimitConfig {
    fn from_env() -> Self {
        Self {
            max_requests: env_parse("RATE_LIMIT_MAX", DEFAULT_MAX_REQUESTS),
            window: Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS)),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded (max {limit} requests/{window_secs}s)")]
    Exceeded { limit: usize, window_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config: RateLimitConfig::from_env(),
        }
    }

    /// Check the caller's window, then record the request.
    pub fn check_and_record(&self, addr: IpAddr) -> Result<(), RateLimitError> {
        self.check_and_record_at(addr, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    fn check_and_record_at(&self, addr: IpAddr, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        let deque = inner.entry(addr).or_default();
        prune_window(deque, now, cfg.window);
        if deque.len() >= cfg.max_requests {
            return Err(RateLimitError::Exceeded {
                limit: cfg.max_requests,
                window_secs: cfg.window.as_secs(),
            });
        }
        deque.push_back(now);

        // Drop idle clients so the map stays bounded by active IPs.
        inner.retain(|_, d| !d.is_empty());
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = deque.front() {
        if now.duration_since(*front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max: usize, window: Duration) -> RateLimiter {
        RateLimiter {
            inner: Arc::new(Mutex::new(HashMap::new())),
            config: RateLimitConfig {
                max_requests: max,
                window,
            },
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let rl = limiter(3, Duration::from_secs(900));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(rl.check_and_record_at(ip(1), now).is_ok());
        }
        assert!(matches!(
            rl.check_and_record_at(ip(1), now),
            Err(RateLimitError::Exceeded { limit: 3, .. })
        ));
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let rl = limiter(2, Duration::from_secs(10));
        let start = Instant::now();
        assert!(rl.check_and_record_at(ip(2), start).is_ok());
        assert!(rl.check_and_record_at(ip(2), start).is_ok());
        assert!(rl.check_and_record_at(ip(2), start).is_err());
        // First request ages out of the window.
        let later = start + Duration::from_secs(10);
        assert!(rl.check_and_record_at(ip(2), later).is_ok());
    }

    #[test]
    fn limits_are_per_ip() {
        let rl = limiter(1, Duration::from_secs(900));
        let now = Instant::now();
        assert!(rl.check_and_record_at(ip(3), now).is_ok());
        assert!(rl.check_and_record_at(ip(4), now).is_ok());
        assert!(rl.check_and_record_at(ip(3), now).is_err());
    }
}
