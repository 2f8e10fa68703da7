//! Login throttling against brute force attacks
//!
//! Failed sign-ins are counted per key (the normalized email address) within
//! a sliding window; reaching the limit bans the key for a fixed duration. A
//! successful sign-in clears the counter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Failed attempts tolerated within the window
    pub max_attempts: u32,
    /// Time window in seconds
    pub window_seconds: u64,
    /// Ban duration in seconds
    pub ban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_seconds: 300,        // 5 minutes
            ban_duration_seconds: 3600, // 1 hour
        }
    }
}

#[derive(Debug)]
struct Failures {
    count: u32,
    window_start: Instant,
    banned_until: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Arc<Mutex<HashMap<String, Failures>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `key` may attempt to sign in now
    pub async fn is_allowed(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(key) else {
            return true;
        };

        match entry.banned_until {
            Some(until) if Instant::now() < until => false,
            Some(_) => {
                debug!("Ban on {} expired", key);
                entries.remove(key);
                true
            }
            None => true,
        }
    }

    /// Count a failed attempt, banning the key once the limit is reached
    pub async fn record_failure(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_seconds);

        let entry = entries.entry(key.to_string()).or_insert(Failures {
            count: 0,
            window_start: now,
            banned_until: None,
        });
        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count >= self.config.max_attempts && entry.banned_until.is_none() {
            entry.banned_until = Some(now + Duration::from_secs(self.config.ban_duration_seconds));
            info!(
                "Banned key {} for {} seconds",
                key, self.config.ban_duration_seconds
            );
        }
    }

    /// Forget every failure of `key`
    pub async fn reset(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(ban_duration_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_attempts: 3,
            window_seconds: 300,
            ban_duration_seconds,
        })
    }

    #[tokio::test]
    async fn test_bans_after_max_failures() {
        let limiter = limiter(3600);
        for _ in 0..2 {
            limiter.record_failure("ada@example.com").await;
            assert!(limiter.is_allowed("ada@example.com").await);
        }

        limiter.record_failure("ada@example.com").await;
        assert!(!limiter.is_allowed("ada@example.com").await);
        assert!(limiter.is_allowed("grace@example.com").await);
    }

    #[tokio::test]
    async fn test_reset_clears_failures() {
        let limiter = limiter(3600);
        for _ in 0..3 {
            limiter.record_failure("ada@example.com").await;
        }
        limiter.reset("ada@example.com").await;
        assert!(limiter.is_allowed("ada@example.com").await);
    }

    #[tokio::test]
    async fn test_ban_expires() {
        let limiter = limiter(0);
        for _ in 0..3 {
            limiter.record_failure("ada@example.com").await;
        }
        assert!(limiter.is_allowed("ada@example.com").await);
    }
}
