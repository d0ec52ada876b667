//! Security middleware stack for `/skills/*` and `/a2a` (component C3).
//!
//! Order, outermost first: audit log → input validation → rate limiter →
//! security headers. Auth itself is handled separately at the handler
//! boundary (see `server.rs`) since it needs the bearer token per-route.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

use crate::utils::rate_limiter::RateLimiter;

const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;
const MAX_URL_LEN: usize = 2048;
const MAX_HEADER_LEN: usize = 8 * 1024;
const SLOW_REQUEST_SECS: u64 = 10;

const BLOCKLIST: &[&str] = &[
    "<script",
    "javascript:",
    "vbscript:",
    "onload=",
    "onerror=",
    "eval(",
    "settimeout(",
    "setinterval(",
    "document.cookie",
    "document.write",
    "../",
    "..\\",
    "drop table",
    "delete from",
    "insert into",
    "update set",
    "union select",
    "or 1=1",
    "and 1=1",
    "' or '1'='1",
    "\" or \"1\"=\"1",
];

#[derive(Clone)]
pub struct SecurityState {
    pub rate_limiter: Arc<RateLimiter>,
}

/// Audit log: one `AUTH_ATTEMPT` line per `/skills/*` and `/a2a` request, a
/// `SECURITY_EVENT` line on 401/403/429, and `SLOW_REQUEST` past 10s.
pub async fn audit_log_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if path.starts_with("/skills/") || path == "/a2a" {
        info!(event = "AUTH_ATTEMPT", %method, %path, "protected endpoint accessed");
    }

    let response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS) {
        warn!(event = "SECURITY_EVENT", %method, %path, %status, "request rejected");
    }
    if elapsed.as_secs() >= SLOW_REQUEST_SECS {
        warn!(event = "SLOW_REQUEST", %method, %path, elapsed_ms = elapsed.as_millis() as u64, "handling exceeded 10s");
    }

    response
}

/// Reject oversize or suspicious requests before any rate-limit or handler
/// work happens.
pub async fn input_validation_middleware(headers: HeaderMap, request: Request, next: Next) -> Result<Response, StatusCode> {
    let uri = request.uri().to_string();
    if uri.len() > MAX_URL_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if contains_blocked_pattern(&uri) {
        return Err(StatusCode::BAD_REQUEST);
    }

    for value in headers.values() {
        let raw = value.as_bytes();
        if raw.len() > MAX_HEADER_LEN {
            return Err(StatusCode::BAD_REQUEST);
        }
        if let Ok(s) = value.to_str() {
            if contains_blocked_pattern(s) {
                return Err(StatusCode::BAD_REQUEST);
            }
        }
    }

    if let Some(len) = headers
        .get("content-length")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    {
        if len > MAX_BODY_BYTES {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

fn contains_blocked_pattern(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    BLOCKLIST.iter().any(|pattern| lower.contains(pattern))
}

/// Sliding-window rate limiting, rejecting with 429 and the standard
/// `Retry-After`/`X-RateLimit-*` headers.
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let client_ip = extract_client_ip(&headers);
    let ip_key = client_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string());
    let ip = client_ip.unwrap_or_else(|| IpAddr::from([0, 0, 0, 0]));

    match state.rate_limiter.check(&ip_key, ip).await {
        Ok(()) => Ok(next.run(request).await),
        Err(err) => {
            let mut response = Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .header("Retry-After", err.retry_after_secs.to_string())
                .header("X-RateLimit-Limit", "0")
                .header("X-RateLimit-Remaining", "0")
                .body(Body::empty())
                .expect("static response is well-formed");
            response.extensions_mut().insert(err.tier);
            Ok(response)
        }
    }
}

fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    for header_name in ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = headers.get(header_name) {
            if let Ok(s) = value.to_str() {
                let first = s.split(',').next().unwrap_or(s).trim();
                if let Ok(ip) = first.parse::<IpAddr>() {
                    return Some(ip);
                }
            }
        }
    }
    None
}

/// Injects the fixed security header set onto every response.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", "nosniff".parse().expect("static header value"));
    headers.insert("X-Frame-Options", "DENY".parse().expect("static header value"));
    headers.insert("X-XSS-Protection", "1; mode=block".parse().expect("static header value"));
    headers.insert(
        "Strict-Transport-Security",
        "max-age=31536000; includeSubDomains".parse().expect("static header value"),
    );
    headers.insert(
        "Referrer-Policy",
        "strict-origin-when-cross-origin".parse().expect("static header value"),
    );
    headers.insert(
        "Content-Security-Policy",
        "default-src 'self'; script-src 'self'; style-src 'self'; object-src 'none'; frame-ancestors 'none'"
            .parse()
            .expect("static header value"),
    );
    headers.insert(
        "Permissions-Policy",
        "geolocation=(), microphone=(), camera=(), payment=(), usb=()"
            .parse()
            .expect("static header value"),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocklist_catches_script_tag() {
        assert!(contains_blocked_pattern("/skills/x?q=<script>alert(1)</script>"));
    }

    #[test]
    fn blocklist_catches_sql_injection() {
        assert!(contains_blocked_pattern("/skills/x?id=1' OR '1'='1"));
    }

    #[test]
    fn blocklist_ignores_benign_url() {
        assert!(!contains_blocked_pattern("/skills/fetch_posts_by_topic"));
    }

    #[test]
    fn blocklist_is_case_insensitive() {
        assert!(contains_blocked_pattern("/x?y=DROP TABLE tasks"));
    }
}
