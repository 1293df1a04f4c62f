// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for driving the enrolment router end to end.
//!
//! Requests go through `tower::ServiceExt::oneshot` against a router built
//! from real components, with mail delivery captured in memory.

#![allow(dead_code)]

pub mod forms;
pub mod generators;
pub mod mail;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use enrolment_intake::{
    captcha::CaptchaVerifier,
    config::{Config, RateLimitBackend},
    cors::CorsPolicy,
    handlers::{router, AppState},
    limiter::RateLimiter,
    mailer::Mailer,
    metrics::IntakeMetrics,
    validator::SubmissionValidator,
};
use forms::FormBuilder;
use mail::RecordingTransport;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Origin the test app allows.
pub const SITE_ORIGIN: &str = "https://solartantra.com";

/// Peer address used when a test does not care about the client.
pub const DEFAULT_PEER: &str = "203.0.113.10:40000";

/// A router plus handles on its collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub mail: Arc<RecordingTransport>,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// App with the default test configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Post `form` from the allowed origin.
    pub async fn submit(&self, form: FormBuilder) -> Response {
        self.send(enrol_request(form, Some(SITE_ORIGIN), DEFAULT_PEER))
            .await
    }
}

pub struct TestAppBuilder {
    config: Config,
    mail: RecordingTransport,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        let mut config = Config::default();
        config.cors.allowed_origins = vec![SITE_ORIGIN.to_string()];
        config.mail.timeout_ms = 1000;
        config.captcha.timeout_ms = 1000;

        Self {
            config,
            mail: RecordingTransport::default(),
        }
    }
}

impl TestAppBuilder {
    /// Adjust the configuration before the app is built.
    pub fn configure(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    /// Make every mail delivery fail.
    pub fn failing_mail(mut self) -> Self {
        self.mail = RecordingTransport::failing();
        self
    }

    /// Make the mail transport panic mid-request.
    pub fn panicking_mail(mut self) -> Self {
        self.mail = RecordingTransport::with_behaviour(mail::Behaviour::Panic);
        self
    }

    pub fn build(self) -> TestApp {
        let config = self.config;
        let limiter = match config.rate_limit.backend {
            RateLimitBackend::Memory => RateLimiter::in_memory(config.rate_limit.clone()),
            _ => RateLimiter::disabled(config.rate_limit.clone()),
        };
        let mail = Arc::new(self.mail);

        let state = Arc::new(AppState {
            cors: CorsPolicy::from_config(&config.cors),
            limiter,
            validator: SubmissionValidator::default(),
            captcha: CaptchaVerifier::new(&config.captcha).expect("captcha client"),
            mailer: Mailer::new(&config.mail, mail.clone()),
            metrics: IntakeMetrics::new().expect("metrics registry"),
            config,
        });

        TestApp {
            router: router(state.clone()),
            state,
            mail,
        }
    }
}

/// Build a `POST /enrol` request carrying `form`.
pub fn enrol_request(form: FormBuilder, origin: Option<&str>, peer: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/enrol")
        .header(header::CONTENT_TYPE, form.content_type());
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }

    let mut request = builder
        .body(Body::from(form.into_body()))
        .expect("valid request");
    with_peer(&mut request, peer);
    request
}

/// Build an `OPTIONS /enrol` preflight.
pub fn preflight_request(origin: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::OPTIONS)
        .uri("/enrol")
        .header("access-control-request-method", "POST");
    if let Some(origin) = origin {
        builder = builder.header(header::ORIGIN, origin);
    }
    builder.body(Body::empty()).expect("valid request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

/// Attach the socket peer address the server would normally record.
pub fn with_peer(request: &mut Request<Body>, peer: &str) {
    let addr: SocketAddr = peer.parse().expect("valid socket address");
    request.extensions_mut().insert(ConnectInfo(addr));
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("JSON body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("UTF-8 body")
}
