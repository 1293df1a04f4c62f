// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Enrolment Intake Service
//!
//! Accepts the website's enrolment form and relays it by email.
//!
//! ## Endpoints
//!
//! - `POST /enrol`: multipart enrolment form
//! - `OPTIONS /enrol`: CORS preflight
//! - `GET /health`: liveness
//! - `GET /metrics`: Prometheus metrics (when enabled)
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and a `.env` file
//! when present):
//!
//! - `BIND_ADDR` / `PORT`: Server bind address (default: 0.0.0.0:8080)
//! - `ALLOWED_ORIGINS`, `ALLOW_NO_ORIGIN`: origin policy
//! - `RATE_LIMIT_BACKEND`, `REDIS_URL`, `RATE_LIMIT_WINDOW_MS`, `RATE_LIMIT_MAX`
//! - `MAX_FILE_BYTES`: attachment cap (default: 5 MiB)
//! - `TURNSTILE_SECRET`: enables CAPTCHA verification
//! - `MAIL_TRANSPORT`, `SMTP_*`, `MAIL_API_*`, `TO_EMAIL`, `FROM_EMAIL`

use axum::Router;
use enrolment_intake::{
    captcha::CaptchaVerifier,
    config::{Config, RateLimitBackend},
    cors::CorsPolicy,
    handlers::{router, AppState},
    limiter::RateLimiter,
    mailer::Mailer,
    metrics::IntakeMetrics,
    transport,
    validator::SubmissionValidator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        allowed_origins = ?config.cors.allowed_origins,
        allow_no_origin = config.cors.allow_no_origin,
        rate_limit_backend = ?config.rate_limit.backend,
        window_ms = config.rate_limit.window_ms,
        max_requests = config.rate_limit.max_requests,
        captcha_enabled = config.captcha.secret.is_some(),
        mail_transport = ?config.mail.transport,
        "Starting enrolment intake"
    );
    if config.cors.allowed_origins.is_empty() && !config.cors.allow_no_origin {
        warn!("No origins allowed; every enrolment will be rejected");
    }
    if config.rate_limit.backend != RateLimitBackend::Disabled
        && config.rate_limit.max_requests == 0
    {
        warn!("RATE_LIMIT_MAX is 0; every enrolment will be rate limited");
    }

    let state = Arc::new(build_state(config).await?);

    if state.config.rate_limit.backend == RateLimitBackend::Memory {
        let cleanup_state = state.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(cleanup_state.config.rate_limit.cleanup_interval());
            loop {
                interval.tick().await;
                cleanup_state.limiter.cleanup().await;
            }
        });
    }

    let addr: SocketAddr = state.config.bind_addr.parse()?;
    let app: Router = router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let limiter = RateLimiter::from_config(config.rate_limit.clone()).await;
    let captcha = CaptchaVerifier::new(&config.captcha)?;
    let mail_transport = transport::from_config(&config.mail)?;
    let mailer = Mailer::new(&config.mail, mail_transport);

    Ok(AppState {
        cors: CorsPolicy::from_config(&config.cors),
        limiter,
        validator: SubmissionValidator::default(),
        captcha,
        mailer,
        metrics: IntakeMetrics::new()?,
        config,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
