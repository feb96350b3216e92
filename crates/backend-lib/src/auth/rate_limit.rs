// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Lockout for clients that keep failing the handshake.

use dashmap::DashMap;
use metrics::counter;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::metrics::AUTH_LOCKOUT;

/// Entry in the rate limit map
#[derive(Debug, Clone)]
struct RateLimitEntry {
    /// Number of failed attempts
    failed_attempts: u32,
    /// Time of the last failed attempt
    last_failure: Instant,
    /// Set while the IP is locked out
    lockout_expiry: Option<Instant>,
}

/// Rate limiter for failed handshakes
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    /// Map of IP addresses to rate limit entries
    attempts: Arc<DashMap<IpAddr, RateLimitEntry>>,
    /// Maximum number of failed attempts before lockout
    max_attempts: u32,
    /// Duration of lockout period
    lockout_duration: Duration,
}

impl AuthRateLimiter {
    /// Create a new auth rate limiter
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts,
            lockout_duration,
        }
    }

    /// Record a failed handshake
    pub fn record_failed_attempt(&self, ip: IpAddr) {
        let now = Instant::now();

        let mut entry = self.attempts.entry(ip).or_insert_with(|| RateLimitEntry {
            failed_attempts: 0,
            last_failure: now,
            lockout_expiry: None,
        });

        // An expired lockout starts a fresh window
        if entry.lockout_expiry.is_some_and(|expiry| now >= expiry) {
            entry.failed_attempts = 0;
            entry.lockout_expiry = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.lockout_expiry.is_none() {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            counter!(AUTH_LOCKOUT).increment(1);
            tracing::warn!(%ip, attempts = entry.failed_attempts, "locking out client after failed handshakes");
        }
    }

    /// A successful handshake clears the history
    pub fn record_success(&self, ip: IpAddr) {
        self.attempts.remove(&ip);
    }

    /// Check if an IP is allowed to attempt a handshake
    pub fn check_rate_limit(&self, ip: IpAddr) -> bool {
        self.attempts
            .get(&ip)
            .and_then(|entry| entry.lockout_expiry)
            .is_none_or(|expiry| Instant::now() >= expiry)
    }

    /// Drop expired lockouts and stale failure counts
    pub fn cleanup(&self) {
        let now = Instant::now();
        let stale_after = self.lockout_duration.max(Duration::from_secs(60 * 60));
        self.attempts.retain(|_, entry| match entry.lockout_expiry {
            Some(expiry) => now < expiry,
            None => now.duration_since(entry.last_failure) < stale_after,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const IP: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[test]
    fn test_lockout_after_max_attempts() {
        let limiter = AuthRateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            limiter.record_failed_attempt(IP);
            assert!(limiter.check_rate_limit(IP));
        }
        limiter.record_failed_attempt(IP);
        assert!(!limiter.check_rate_limit(IP));

        // other clients are unaffected
        assert!(limiter.check_rate_limit(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_success_resets_history() {
        let limiter = AuthRateLimiter::new(2, Duration::from_secs(60));
        limiter.record_failed_attempt(IP);
        limiter.record_success(IP);
        limiter.record_failed_attempt(IP);
        assert!(limiter.check_rate_limit(IP));
    }

    #[test]
    fn test_lockout_expires() {
        let limiter = AuthRateLimiter::new(1, Duration::from_millis(0));
        limiter.record_failed_attempt(IP);
        assert!(limiter.check_rate_limit(IP));
        limiter.cleanup();
        assert!(limiter.attempts.is_empty());
    }
}
