// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Enrolment Intake
//!
//! Backend for the website's enrolment form. A submission passes through
//! a fixed pipeline and is relayed as a single email:
//!
//! - Origin allow-list check (CORS)
//! - Per-IP fixed-window rate limiting (in-memory or Redis)
//! - Multipart parsing with a streamed attachment size cap
//! - Field validation (required fields, digit counts)
//! - Optional CAPTCHA verification
//! - Mail relay over SMTP or an HTTP mail API

pub mod captcha;
pub mod clock;
pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod mailer;
pub mod metrics;
pub mod store;
pub mod submission;
pub mod transport;
pub mod validator;

pub use config::Config;
pub use error::IntakeError;
pub use handlers::{router, AppState};
pub use limiter::{RateLimitResult, RateLimiter};
pub use mailer::{MailTransport, Mailer};
pub use submission::Submission;
pub use validator::{validate, SubmissionValidator};
