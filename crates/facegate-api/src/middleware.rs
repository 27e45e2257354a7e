//! API middleware.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use facegate_access::{AccessController, AccessError, AccessPolicy, Admission};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn, Span};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-client-IP flood protection.
///
/// Independent of call budgets: it throttles request rate per address, not
/// the number of detections an identity may run.
#[derive(Clone)]
pub struct IpRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl IpRateLimiter {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rps).max(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Returns true if a request from `ip` is allowed now.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forget addresses whose state has fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// Create CORS layer.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let exposed_headers = [
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        HeaderName::from_static(REQUEST_ID_HEADER),
        HeaderName::from_static(RATE_LIMIT_LIMIT_HEADER),
        HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
    ];

    if origins.iter().any(|o| o == "*") {
        // Wildcard origin - no credentials allowed, can use Any
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
            .expose_headers(exposed_headers)
            .allow_origin(Any)
            .max_age(std::time::Duration::from_secs(600))
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::ORIGIN,
                HeaderName::from_static(API_KEY_HEADER),
                HeaderName::from_static(REQUEST_ID_HEADER),
            ])
            .expose_headers(exposed_headers)
            .allow_origin(origins)
            .max_age(std::time::Duration::from_secs(600))
    }
}

/// Security headers middleware.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in [
        ("x-content-type-options", "nosniff"),
        ("x-frame-options", "DENY"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        ("cross-origin-resource-policy", "same-origin"),
        ("x-permitted-cross-domain-policies", "none"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    response
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());
    Span::current().record("request_id", &request_id);

    let mut response = next.run(request).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }

    response
}

/// Request logging middleware.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();

    // Skip health check logging
    if uri.path() != "/health" && uri.path() != "/ready" {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

/// Per-IP rate limiting middleware.
pub async fn rate_limit_middleware(
    State(rate_limiter): State<IpRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = extract_client_ip(&request) {
        if !rate_limiter.check(ip) {
            warn!(ip = %ip, "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            let mut response = ApiError::RateLimited.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            return response;
        }
    }

    next.run(request).await
}

/// State for [`access_gate`]: the controller plus the policy of the routes it
/// guards.
#[derive(Clone)]
pub struct AccessGate {
    pub access: AccessController,
    pub policy: AccessPolicy,
}

impl AccessGate {
    pub fn new(access: AccessController, policy: AccessPolicy) -> Self {
        Self { access, policy }
    }
}

/// Authenticate the caller and, on metered routes, charge one call.
///
/// Runs before the body is read, so unauthenticated callers never reach the
/// detector. The [`Admission`] is made available to handlers as an extension.
pub async fn access_gate(
    State(gate): State<AccessGate>,
    mut request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match gate.access.admit(provided.as_deref(), gate.policy).await {
        Ok(admission) => {
            debug!(identity = ?admission.identity, calls_used = ?admission.calls_used, "Request admitted");
            request.extensions_mut().insert(admission.clone());
            let mut response = next.run(request).await;
            insert_budget_headers(response.headers_mut(), &admission);
            response
        }
        Err(err) => {
            let limit = gate.access.config().call_limit;
            let exceeded = matches!(err, AccessError::QuotaExceeded { .. });
            let mut response = ApiError::from(err).into_response();
            if exceeded {
                let headers = response.headers_mut();
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u64));
            }
            response
        }
    }
}

fn insert_budget_headers(headers: &mut HeaderMap, admission: &Admission) {
    if let Some(remaining) = admission.remaining() {
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(admission.limit));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
    }
}

/// Extract client IP from request headers or connection info.
fn extract_client_ip(request: &Request<Body>) -> Option<IpAddr> {
    // Try X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            // Take the first IP in the chain (original client)
            if let Some(first_ip) = forwarded_str.split(',').next() {
                if let Ok(ip) = first_ip.trim().parse() {
                    return Some(ip);
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip) = real_ip.to_str().map(str::trim).unwrap_or_default().parse() {
            return Some(ip);
        }
    }

    // Fall back to connection info (requires ConnectInfo extractor in router)
    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip())
}

/// 404 fallback in the shared error shape.
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        axum::Json(crate::error::ErrorResponse {
            detail: "Not Found".to_string(),
            code: "not_found".to_string(),
        }),
    )
}
