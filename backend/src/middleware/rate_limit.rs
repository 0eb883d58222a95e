//! Fixed-window request limiter keyed by client address

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::AppError;
use crate::AppState;

/// Bucket for requests that arrive without connection info
const SHARED_BUCKET: &str = "unknown";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-memory rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            limit: config.requests_per_window,
            window: Duration::from_secs(config.window_secs.max(1)),
        }
    }

    /// Count one request for `key`; on refusal returns seconds until the
    /// window resets
    pub fn check(&self, key: &str) -> Result<u32, u64> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let reset = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(reset.as_secs().max(1));
        }

        entry.count += 1;
        Ok(self.limit - entry.count)
    }

    /// Drop windows that have expired
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

/// Reject requests over the per-client limit with 429
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let key = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| SHARED_BUCKET.to_string());

    match state.rate_limiter.check(&key) {
        Ok(_) => next.run(request).await,
        Err(retry_after_secs) => {
            tracing::warn!(client = %key, retry_after_secs, "Rate limit exceeded");
            AppError::RateLimited { retry_after_secs }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_key() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            requests_per_window: 2,
            window_secs: 60,
        });

        assert_eq!(limiter.check("10.0.0.1"), Ok(1));
        assert_eq!(limiter.check("10.0.0.1"), Ok(0));
        assert!(limiter.check("10.0.0.1").is_err());
        assert_eq!(limiter.check("10.0.0.2"), Ok(1));
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            requests_per_window: 0,
            window_secs: 30,
        });
        let retry = limiter.check("x").unwrap_err();
        assert!((1..=30).contains(&retry));
    }
}
