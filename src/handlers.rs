// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the enrolment intake service.
//!
//! `POST /enrol` runs the pipeline
//! origin → rate limit → parse → validate → captcha → mail,
//! stopping at the first failing stage. The origin stage lives in
//! [`crate::cors::origin_guard`], layered onto the route.
//!
//! Every response carries a fixed set of browser hardening headers
//! (`X-Content-Type-Options`, `X-Frame-Options`, HSTS, CSP and friends).

use crate::captcha::CaptchaVerifier;
use crate::config::Config;
use crate::cors::{origin_guard, CorsPolicy};
use crate::error::{ceil_secs, IntakeError, Result};
use crate::limiter::{RateLimitResult, RateLimiter};
use crate::mailer::Mailer;
use crate::metrics::{IntakeMetrics, ACCEPTED};
use crate::submission::Submission;
use crate::validator::SubmissionValidator;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Room for the text fields and multipart framing on top of the attachment.
pub const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Rate-limit key for requests whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Shared application state.
pub struct AppState {
    pub cors: CorsPolicy,
    pub limiter: RateLimiter,
    pub validator: SubmissionValidator,
    pub captcha: CaptchaVerifier,
    pub mailer: Mailer,
    pub metrics: IntakeMetrics,
    pub config: Config,
}

/// Success body, also used by the health check.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Headers set on every response unless a handler already set them.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;form-action 'self';\
         frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
         script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config
        .upload
        .max_file_bytes
        .saturating_add(FORM_OVERHEAD_BYTES);

    // Panics inside the enrolment pipeline are caught beneath the origin
    // guard so the 500 still carries CORS headers.
    let panic_metrics = state.metrics.clone();
    let enrol_route = post(enrol)
        .options(preflight)
        .route_layer(CatchPanicLayer::custom(
            move |_panic: Box<dyn Any + Send + 'static>| {
                let err = IntakeError::Internal("enrolment handler panicked".to_string());
                panic_metrics.record(err.outcome());
                err.into_response()
            },
        ))
        .route_layer(middleware::from_fn_with_state(state.clone(), origin_guard));

    let mut router = Router::new()
        .route("/health", get(health))
        .route("/enrol", enrol_route);

    if state.config.metrics.enabled {
        let path = &state.config.metrics.path;
        let path = if path.starts_with('/') {
            path.clone()
        } else {
            format!("/{path}")
        };
        router = router.route(&path, get(metrics));
    }

    let router = router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(DefaultBodyLimit::max(body_limit)),
    );

    with_security_headers(router).with_state(state)
}

fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SECURITY_HEADERS.iter().fold(router, |router, &(name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ))
    })
}

/// Health check endpoint.
pub async fn health() -> Json<OkResponse> {
    Json(OkResponse { ok: true })
}

/// Preflight requests are answered by the origin guard; this only runs if
/// the guard is bypassed.
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => IntakeError::Internal(format!("metrics encoding failed: {err}")).into_response(),
    }
}

/// Accept an enrolment form and relay it by email.
///
/// While the limiter is enabled every response carries the
/// `RateLimit-Limit`, `RateLimit-Remaining` and `RateLimit-Reset` headers.
pub async fn enrol(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let client_ip = client_ip(&request, state.config.trust_proxy);
    let client = client_ip.map_or_else(|| UNKNOWN_CLIENT.to_string(), |ip| ip.to_string());

    let rate = state.limiter.check_and_increment(&client).await;
    let outcome = match rate {
        RateLimitResult::Limited { retry_after } => {
            info!(%client, ?retry_after, "Enrolment rate limited");
            Err(IntakeError::RateLimited { retry_after })
        }
        RateLimitResult::Allowed { .. } => {
            process_submission(&state, request, &client, client_ip).await
        }
    };

    let mut response = match outcome {
        Ok(()) => {
            state.metrics.record(ACCEPTED);
            Json(OkResponse { ok: true }).into_response()
        }
        Err(err) => {
            state.metrics.record(err.outcome());
            err.into_response()
        }
    };

    if state.limiter.is_enabled() {
        response
            .headers_mut()
            .extend(rate_limit_headers(&rate, state.limiter.max_requests()));
    }
    response
}

async fn process_submission(
    state: &AppState,
    request: Request,
    client: &str,
    client_ip: Option<IpAddr>,
) -> Result<()> {
    let multipart = Multipart::from_request(request, &()).await.map_err(|rejection| {
        debug!(%client, error = %rejection, "Rejected non-multipart enrolment");
        IntakeError::ValidationFailed(vec![rejection.body_text()])
    })?;
    let submission =
        Submission::from_multipart(multipart, state.config.upload.max_file_bytes).await?;

    let errors = state.validator.validate(&submission);
    if !errors.is_empty() {
        info!(%client, errors = ?errors, "Enrolment failed validation");
        return Err(IntakeError::ValidationFailed(errors));
    }

    let remote_ip = client_ip.map(|ip| ip.to_string());
    if !state
        .captcha
        .verify(submission.captcha_token.as_deref(), remote_ip.as_deref())
        .await
    {
        info!(%client, "Enrolment failed captcha verification");
        return Err(IntakeError::CaptchaFailed);
    }

    state.mailer.send(&submission).await?;
    if let Some(attachment) = &submission.attachment {
        state.metrics.observe_attachment(attachment.len());
    }
    info!(
        %client,
        has_attachment = submission.attachment.is_some(),
        "Enrolment relayed"
    );
    Ok(())
}

/// `RateLimit-*` headers describing the caller's current window.
fn rate_limit_headers(result: &RateLimitResult, limit: u32) -> HeaderMap {
    let (remaining, reset) = match result {
        RateLimitResult::Allowed {
            remaining,
            reset_in,
        } => (*remaining, *reset_in),
        RateLimitResult::Limited { retry_after } => (0, *retry_after),
    };

    let mut headers = HeaderMap::new();
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset)));
    headers
}

/// Client address for rate limiting and CAPTCHA.
///
/// Behind a trusted proxy the `CF-Connecting-IP` header wins, then the last
/// `X-Forwarded-For` hop; otherwise the socket peer address is used.
fn client_ip(request: &Request, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        let headers = request.headers();
        let cf: Option<IpAddr> = headers
            .get("cf-connecting-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let forwarded = || {
            headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit(',').next())
                .and_then(|v| v.trim().parse().ok())
        };
        if let Some(ip) = cf.or_else(forwarded) {
            return Some(ip);
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn panic_response(_panic: Box<dyn Any + Send + 'static>) -> Response {
    IntakeError::Internal("request handler panicked".to_string()).into_response()
}
