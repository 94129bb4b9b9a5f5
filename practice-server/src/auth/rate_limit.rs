//! Login rate limiting (fixed window per client IP)

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::AppError;
use crate::core::ServerState;
use crate::security_log;
use shared::ErrorCode;

/// Entries older than this are dropped by [`RateLimiter::cleanup`]
const STALE_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Request counter per (route, client IP)
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Arc<DashMap<(&'static str, String), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request; `false` once the window's budget is spent
    pub fn check(&self, route: &'static str, ip: &str, max_requests: u32, window_secs: u64) -> bool {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry((route, ip.to_owned()))
            .or_insert_with(|| Window {
                count: 0,
                started: now,
            });

        if now.duration_since(entry.started).as_secs() >= window_secs {
            entry.count = 0;
            entry.started = now;
        }

        entry.count += 1;
        entry.count <= max_requests
    }

    /// Drop windows that started more than five minutes ago
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < STALE_AFTER);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Client IP: first `X-Forwarded-For` entry, then the peer address
pub fn extract_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(val) = forwarded.to_str()
        && let Some(first) = val.split(',').next()
    {
        let ip = first.trim();
        if !ip.is_empty() {
            return ip.to_owned();
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Middleware for `POST /api/auth/login`
pub async fn login_rate_limit(
    State(state): State<ServerState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = extract_ip(&request);
    let config = &state.config;
    if !state
        .rate_limiter
        .check("login", &ip, config.login_max_attempts, config.login_window_secs)
    {
        security_log!("WARN", "login_rate_limited", ip = ip.clone());
        return Err(AppError::new(ErrorCode::TooManyAttempts));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_budget() {
        let limiter = RateLimiter::new();
        for _ in 0..3 {
            assert!(limiter.check("login", "10.0.0.1", 3, 60));
        }
        assert!(!limiter.check("login", "10.0.0.1", 3, 60));
        // other clients are unaffected
        assert!(limiter.check("login", "10.0.0.2", 3, 60));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets() {
        let limiter = RateLimiter::new();
        assert!(limiter.check("login", "ip", 1, 60));
        assert!(!limiter.check("login", "ip", 1, 60));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check("login", "ip", 1, 60));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.check("login", "ip", 5, 60);
        assert_eq!(limiter.len(), 1);
        tokio::time::advance(STALE_AFTER + Duration::from_secs(1)).await;
        limiter.cleanup();
        assert!(limiter.is_empty());
    }

    #[test]
    fn forwarded_for_wins() {
        let req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_ip(&req), "203.0.113.9");

        let req = Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_ip(&req), "unknown");
    }
}
