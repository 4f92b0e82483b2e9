use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;

/// Sliding-window request limiter keyed by caller-supplied strings.
#[derive(Debug)]
pub struct RateLimiter {
    inner: Mutex<HashMap<String, Vec<Instant>>>,
    max: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max,
            window,
        }
    }

    pub async fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let entries = guard.entry(key.to_string()).or_default();
        entries.retain(|ts| now.saturating_duration_since(*ts) < self.window);
        if entries.len() >= self.max {
            return Err(RateLimitError);
        }
        entries.push(now);
        Ok(())
    }
}

#[derive(Debug)]
pub struct RateLimitError;

pub fn key(route: &str, provider: &str) -> String {
    format!("{}:{}", route, provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_max_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.check("k").await.expect("first");
        limiter.check("k").await.expect("second");
        assert!(limiter.check("k").await.is_err());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check("a").await.expect("a");
        limiter.check("b").await.expect("b");
        assert!(limiter.check("a").await.is_err());
    }

    #[tokio::test]
    async fn window_expiry_frees_budget() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        limiter.check("k").await.expect("first");
        tokio::time::sleep(Duration::from_millis(20)).await;
        limiter.check("k").await.expect("after window");
    }
}
