//! Per-IP fixed-window request limiter for the `/api` tree.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::warn;

use crate::{config::RateLimitConfig, error::AppError, state::AppState};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    used: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    max_requests: u32,
    window: Duration,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
            trust_proxy: config.trust_proxy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Counts one request. Returns the remaining budget, or `None` once the
    /// window is used up.
    pub fn check(&self, ip: IpAddr) -> Option<u32> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Option<u32> {
        if !self.is_enabled() {
            return Some(u32::MAX);
        }
        let mut entry = self.windows.entry(ip).or_insert(Window { started: now, used: 0 });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window { started: now, used: 0 };
        }
        if entry.used >= self.max_requests {
            return None;
        }
        entry.used += 1;
        Some(self.max_requests - entry.used)
    }

    /// Drops windows that have already expired.
    pub fn purge(&self) {
        let now = Instant::now();
        self.windows.retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

fn forwarded_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
        })
}

/// The socket peer, or the forwarded client address when `trust_proxy` is set.
fn client_ip(request: &Request, trust_proxy: bool) -> IpAddr {
    let forwarded = if trust_proxy { forwarded_ip(request) } else { None };
    let peer = || {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    };
    forwarded.or_else(peer).unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn limit_requests(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    if !state.limiter.is_enabled() {
        return Ok(next.run(request).await);
    }
    let ip = client_ip(&request, state.limiter.trust_proxy);
    match state.limiter.check(ip) {
        Some(remaining) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(state.config.rate_limit.max_requests));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            Ok(response)
        }
        None => {
            warn!(%ip, "rate limit exceeded");
            Err(AppError::TooManyRequests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_seconds: 60,
            trust_proxy: false,
        })
    }

    fn request_from(peer: &str, forwarded: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder();
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value).header("x-real-ip", value);
        }
        let mut request = builder.body(axum::body::Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    }

    #[test]
    fn blocks_after_the_limit_within_a_window() {
        let limiter = limiter(2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();
        assert_eq!(limiter.check_at(ip, now), Some(1));
        assert_eq!(limiter.check_at(ip, now), Some(0));
        assert!(limiter.check_at(ip, now).is_none());

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check_at(other, now).is_some());
    }

    #[test]
    fn a_new_window_resets_the_count() {
        let limiter = limiter(1);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let now = Instant::now();
        assert!(limiter.check_at(ip, now).is_some());
        assert!(limiter.check_at(ip, now).is_none());
        assert!(limiter.check_at(ip, now + Duration::from_secs(61)).is_some());
    }

    #[test]
    fn zero_means_unlimited() {
        let limiter = limiter(0);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert!(limiter.check(ip).is_some());
        }
    }

    #[test]
    fn forwarded_headers_are_ignored_unless_trusted() {
        let spoofed = request_from("198.51.100.7:4000", Some("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_ip(&spoofed, false), "198.51.100.7".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(&spoofed, true), "203.0.113.9".parse::<IpAddr>().unwrap());

        let plain = request_from("198.51.100.7:4000", None);
        assert_eq!(client_ip(&plain, true), "198.51.100.7".parse::<IpAddr>().unwrap());

        let bare = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_ip(&bare, false), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
