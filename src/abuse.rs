//! Anti-abuse middleware for the claim endpoints
//!
//! Rate limits select/confirm/release/wish per device so a single client
//! cannot hammer the claim lifecycle. Requests without a device header pass
//! through untouched; the handlers reject those on their own.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, Response, StatusCode},
    middleware::Next,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::api::DEVICE_ID_HEADER;
use crate::config::RateLimitConfig;
use crate::protocol::ErrorBody;

/// Rate limiter state
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Map of device key to (request count, window start)
    requests: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Arc::new(RwLock::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check if a request should be allowed
    /// Returns true if allowed, false if rate limited
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.write().await;

        match requests.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_requests {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                requests.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop entries whose window ended a while ago
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut requests = self.requests.write().await;
        requests.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }

    pub async fn tracked_keys(&self) -> usize {
        self.requests.read().await.len()
    }
}

/// Spawn a background task that periodically forgets idle devices
pub fn spawn_rate_limit_sweeper(limiter: Arc<RateLimiter>) {
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            limiter.cleanup().await;
        }
    });
}

/// Rate limit key for a request, taken from the device header
fn rate_limit_key(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|device| format!("device:{}", device))
}

/// Build a 429 Too Many Requests response
fn rate_limited(retry_after: Duration) -> Response<Body> {
    let body = ErrorBody {
        code: "RATE_LIMITED".to_string(),
        msg: "Rate limit exceeded. Please slow down.".to_string(),
    };
    let json = serde_json::to_vec(&body).unwrap_or_default();

    let mut response = Response::new(Body::from(json));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs().max(1)));
    response
}

/// Middleware applying the per-device rate limit
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(key) = rate_limit_key(&request) {
        if !limiter.check(&key).await {
            tracing::warn!(key, uri = %request.uri(), "Rate limited");
            return rate_limited(limiter.window());
        }
    }

    next.run(request).await
}
