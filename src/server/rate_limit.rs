//! Per-client-IP sliding-window rate limiter (spec §6: 30 req/min on every
//! mutating path). Purely in-memory — it resets on restart, by design
//! (spec §9's second open question is preserved as-is).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;

const WINDOW: Duration = Duration::from_secs(60);
const MAX_REQUESTS_PER_WINDOW: usize = 30;
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter { buckets: Mutex::new(HashMap::new()) }
    }

    /// Records a request from `ip` and reports whether it's within budget.
    fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        let entry = buckets.entry(ip).or_default();
        entry.retain(|t| now.duration_since(*t) < WINDOW);
        if entry.len() >= MAX_REQUESTS_PER_WINDOW {
            return false;
        }
        entry.push(now);
        true
    }

    /// Drops buckets with no requests in the current window. Run
    /// periodically so the map doesn't grow unbounded across many distinct
    /// client IPs (spec §9: "rate limiters stored in maps, periodically
    /// swept").
    fn sweep(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        buckets.retain(|_, entries| {
            entries.retain(|t| now.duration_since(*t) < WINDOW);
            !entries.is_empty()
        });
    }

    /// Spawns the periodic sweep as a background task. The task is
    /// detached and does not keep the process alive on shutdown (it only
    /// holds a weak reference via the `Arc` the caller keeps elsewhere).
    pub fn spawn_sweeper(self: &std::sync::Arc<Self>) {
        let limiter = std::sync::Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else { break };
                limiter.sweep();
            }
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// `axum::middleware::from_fn_with_state` handler. Only mutating methods
/// (POST, DELETE, PUT, PATCH) are subject to the limit; reads are
/// unrestricted, per spec §6.
pub async fn enforce(
    State(limiter): State<std::sync::Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let is_mutating = matches!(
        *request.method(),
        Method::POST | Method::DELETE | Method::PUT | Method::PATCH
    );
    if is_mutating && !limiter.allow(addr.ip()) {
        info!("rate limit exceeded for {}", addr.ip());
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": "rate limit exceeded, try again later"})),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            assert!(limiter.allow(ip));
        }
        assert!(!limiter.allow(ip));
    }

    #[test]
    fn distinct_ips_have_independent_budgets() {
        let limiter = RateLimiter::new();
        let a: IpAddr = "127.0.0.1".parse().unwrap();
        let b: IpAddr = "127.0.0.2".parse().unwrap();
        for _ in 0..MAX_REQUESTS_PER_WINDOW {
            assert!(limiter.allow(a));
        }
        assert!(!limiter.allow(a));
        assert!(limiter.allow(b));
    }

    #[test]
    fn sweep_drops_empty_buckets() {
        let limiter = RateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        limiter.allow(ip);
        assert_eq!(limiter.buckets.lock().unwrap().len(), 1);

        // Simulate the window having elapsed by clearing entries directly,
        // since Instant cannot be rewound in a test.
        limiter.buckets.lock().unwrap().get_mut(&ip).unwrap().clear();
        limiter.sweep();
        assert_eq!(limiter.buckets.lock().unwrap().len(), 0);
    }
}
