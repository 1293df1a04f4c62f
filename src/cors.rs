// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Origin guard for the enrolment endpoint.
//!
//! Runs ahead of every other stage. Preflight requests are answered here
//! without reaching the handler, and every response leaving the guarded
//! route carries the CORS headers for the caller's origin.

use crate::config::CorsConfig;
use crate::error::IntakeError;
use crate::handlers::AppState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
const MAX_AGE_SECS: &str = "86400";

/// Allow-list of browser origins.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    allowed_origins: HashSet<String>,
    allow_no_origin: bool,
}

impl CorsPolicy {
    pub fn new<I, S>(allowed_origins: I, allow_no_origin: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_origins: allowed_origins.into_iter().map(Into::into).collect(),
            allow_no_origin,
        }
    }

    pub fn from_config(config: &CorsConfig) -> Self {
        Self::new(config.allowed_origins.iter().cloned(), config.allow_no_origin)
    }

    /// Exact match against the allow-list; a missing origin passes only
    /// when no-origin requests are permitted.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self.allowed_origins.contains(origin),
            None => self.allow_no_origin,
        }
    }

    /// CORS headers for a response to `origin`.
    pub fn headers_for(&self, origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(MAX_AGE_SECS),
        );

        match origin {
            Some(origin) if self.allowed_origins.contains(origin) => {
                if let Ok(value) = HeaderValue::from_str(origin) {
                    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
                    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
                }
            }
            None if self.allow_no_origin => {
                headers.insert(
                    header::ACCESS_CONTROL_ALLOW_ORIGIN,
                    HeaderValue::from_static("*"),
                );
            }
            _ => {}
        }

        headers
    }
}

/// Middleware enforcing the origin policy on the enrolment route.
pub async fn origin_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let cors_headers = state.cors.headers_for(origin.as_deref());

    if request.method() == Method::OPTIONS {
        debug!(origin = ?origin, "Answering preflight");
        return (StatusCode::NO_CONTENT, cors_headers).into_response();
    }

    if !state.cors.is_allowed(origin.as_deref()) {
        info!(origin = ?origin, "Origin rejected");
        let rejection = IntakeError::OriginRejected;
        state.metrics.record(rejection.outcome());
        return (cors_headers, rejection).into_response();
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(cors_headers);
    response
}
