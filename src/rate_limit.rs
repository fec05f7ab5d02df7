//! Per-client rolling-window rate limiting for the anonymous chat relay.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::errors::AppError;

/// Tracked clients above which idle entries are dropped on the next check.
const PURGE_THRESHOLD: usize = 10_000;

/// Requests with no recognizable client address share one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKey {
    Ip(IpAddr),
    Shared,
}

/// Allows at most `limit` requests per client in any rolling `window`.
#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<Mutex<HashMap<ClientKey, VecDeque<Instant>>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            hits: Arc::new(Mutex::new(HashMap::new())),
            limit,
            window,
        }
    }

    /// Record a request and report whether it is within the limit.
    ///
    /// Rejected requests are not recorded, so a client that keeps retrying
    /// regains access once its oldest accepted request leaves the window.
    pub async fn check(&self, key: ClientKey) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: ClientKey, now: Instant) -> bool {
        let mut hits = self.hits.lock().await;

        if hits.len() > PURGE_THRESHOLD {
            retain_active(&mut hits, now, self.window);
        }

        let times = hits.entry(key).or_default();
        while times
            .front()
            .is_some_and(|first| now.duration_since(*first) >= self.window)
        {
            times.pop_front();
        }

        if times.len() >= self.limit {
            return false;
        }
        times.push_back(now);
        true
    }
}

fn retain_active(hits: &mut HashMap<ClientKey, VecDeque<Instant>>, now: Instant, window: Duration) {
    hits.retain(|_, times| {
        times
            .back()
            .is_some_and(|last| now.duration_since(*last) < window)
    });
}

/// Middleware rejecting over-limit clients with 429 before the handler runs.
pub async fn chat_rate_limit(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    let key = extract_client_ip(&req).map_or(ClientKey::Shared, ClientKey::Ip);

    if !limiter.check(key).await {
        warn!(client = ?key, "Chat rate limit exceeded");
        return AppError::RateLimited.into_response();
    }

    next.run(req).await
}

/// Try ConnectInfo first, then X-Forwarded-For, then X-Real-IP.
fn extract_client_ip(req: &Request) -> Option<IpAddr> {
    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(connect_info.0.ip());
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    if forwarded.is_some() {
        return forwarded;
    }

    req.headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
}
