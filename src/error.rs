// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Failure kinds of the intake pipeline and their HTTP mapping.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Why an enrolment was not relayed.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Origin not allowed")]
    OriginRejected,

    #[error("Too many requests")]
    RateLimited { retry_after: Duration },

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("Captcha verification failed")]
    CaptchaFailed,

    #[error("Email delivery failed: {0}")]
    MailDeliveryFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::OriginRejected => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::ValidationFailed(_) | Self::CaptchaFailed => StatusCode::BAD_REQUEST,
            Self::MailDeliveryFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for this failure.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::OriginRejected => "origin_rejected",
            Self::RateLimited { .. } => "rate_limited",
            Self::ValidationFailed(_) => "validation_failed",
            Self::CaptchaFailed => "captcha_failed",
            Self::MailDeliveryFailed(_) => "mail_failed",
            Self::Internal(_) => "internal",
        }
    }

    /// Message safe to show the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::OriginRejected => "Origin not allowed",
            Self::RateLimited { .. } => "Too many requests",
            Self::ValidationFailed(_) => "Validation failed",
            Self::CaptchaFailed => "Captcha verification failed",
            Self::MailDeliveryFailed(_) => "Email delivery failed",
            Self::Internal(_) => "Server error",
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.public_message();

        match self {
            Self::ValidationFailed(details) => (
                status,
                Json(ErrorResponse {
                    error,
                    details: Some(details),
                }),
            )
                .into_response(),
            Self::RateLimited { retry_after } => {
                (
                    status,
                    [(header::RETRY_AFTER, ceil_secs(retry_after).to_string())],
                    Json(ErrorResponse {
                        error,
                        details: None,
                    }),
                )
                    .into_response()
            }
            Self::Internal(detail) => {
                error!(error = %detail, "Enrolment failed with internal error");
                (
                    status,
                    Json(ErrorResponse {
                        error,
                        details: None,
                    }),
                )
                    .into_response()
            }
            _ => (
                status,
                Json(ErrorResponse {
                    error,
                    details: None,
                }),
            )
                .into_response(),
        }
    }
}

/// Whole seconds, rounded up so clients never retry inside the window.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IntakeError>;
