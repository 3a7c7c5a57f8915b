//! Per-IP rate limiting.
//!
//! Each limit is a set of tiers (a burst window plus longer windows), each a
//! keyed token bucket. A request must pass every tier of its limit.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc, time::Duration};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::cli::ClientIpHeader;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Every route: 3/s, 20 per 10 s, 100 per minute.
const GENERAL_TIERS: [(u32, Duration); 3] = [
    (3, Duration::from_secs(1)),
    (20, Duration::from_secs(10)),
    (100, Duration::from_secs(60)),
];

/// Register and login: 1/s, 5 per minute, 10 per 5 minutes.
const CREDENTIAL_TIERS: [(u32, Duration); 3] = [
    (1, Duration::from_secs(1)),
    (5, Duration::from_secs(60)),
    (10, Duration::from_secs(5 * 60)),
];

/// A limiter allowing `count` requests per `window`, refilling evenly across it.
fn window_limiter(count: u32, window: Duration) -> IpLimiter {
    let burst = NonZeroU32::new(count).unwrap_or(NonZeroU32::MIN);
    let quota = Quota::with_period(window / burst.get())
        .map(|quota| quota.allow_burst(burst))
        .unwrap_or_else(|| Quota::per_second(burst));
    RateLimiter::keyed(quota)
}

fn tiers(windows: &[(u32, Duration)]) -> Vec<IpLimiter> {
    windows
        .iter()
        .map(|&(count, window)| window_limiter(count, window))
        .collect()
}

/// Tiered limiters shared by all requests.
pub struct RateLimitConfig {
    pub general: Vec<IpLimiter>,
    pub credentials: Vec<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self {
            general: tiers(&GENERAL_TIERS),
            credentials: tiers(&CREDENTIAL_TIERS),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware state: the limiters plus how to identify the client.
#[derive(Clone)]
pub struct RateLimitState {
    pub limits: Arc<RateLimitConfig>,
    pub ip_header: Option<ClientIpHeader>,
}

impl RateLimitState {
    pub fn new(ip_header: Option<ClientIpHeader>) -> Self {
        Self {
            limits: Arc::new(RateLimitConfig::new()),
            ip_header,
        }
    }
}

fn check_tiers(limiters: &[IpLimiter], ip: &String) -> bool {
    limiters.iter().all(|limiter| limiter.check_key(ip).is_ok())
}

async fn enforce(
    state: &RateLimitState,
    limiters: &[IpLimiter],
    request: Request,
    next: Next,
    message: &str,
) -> Response {
    let ip = match extract_client_ip(&request, state.ip_header) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Rejecting request without client IP");
            return ApiError::forbidden("Unable to determine client IP.").into_response();
        }
    };

    if check_tiers(limiters, &ip) {
        next.run(request).await
    } else {
        warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        ApiError::too_many_requests(message).into_response()
    }
}

/// Middleware applying the general limit to every route.
pub async fn rate_limit_general(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let limits = state.limits.clone();
    enforce(
        &state,
        &limits.general,
        request,
        next,
        "Too many requests. Please try again later.",
    )
    .await
}

/// Middleware applying the stricter credential limit to register and login.
pub async fn rate_limit_credentials(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let limits = state.limits.clone();
    enforce(
        &state,
        &limits.credentials,
        request,
        next,
        "Too many authentication attempts. Please wait before trying again.",
    )
    .await
}
