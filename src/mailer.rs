// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Turns an accepted submission into one outbound email.
//!
//! The mailer owns the envelope (sender, recipient, default subject) and the
//! body layout; delivery is delegated to a [`MailTransport`].

use crate::config::MailConfig;
use crate::error::IntakeError;
use crate::submission::{Attachment, Submission};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Mail construction or delivery failure.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid mailbox {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Mail API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API rejected message with status {0}")]
    Rejected(u16),

    #[error("Mail transport timed out after {0:?}")]
    Timeout(Duration),
}

impl MailError {
    /// True when the message itself could not be produced, as opposed to
    /// the transport failing to deliver it.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, Self::InvalidAddress { .. } | Self::Build(_))
    }
}

impl From<MailError> for IntakeError {
    fn from(err: MailError) -> Self {
        if err.is_construction_error() {
            IntakeError::Internal(err.to_string())
        } else {
            IntakeError::MailDeliveryFailed(err.to_string())
        }
    }
}

/// A fully addressed email ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub subject: String,
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Delivers an [`OutboundMail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Plain-text body listing the five enrolment fields.
pub fn compose_body(submission: &Submission) -> String {
    format!(
        "New enrolment received.\n\n\
         Name: {}\n\
         Consumer Number: {}\n\
         Address: {}\n\
         Postal Code: {}\n\
         Phone: {}\n",
        submission.consumer_name,
        submission.consumer_number,
        submission.consumer_address,
        submission.postal_code,
        submission.phone_number,
    )
}

/// Mail adapter for enrolment notifications.
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    from_email: String,
    from_name: String,
    to_email: String,
    default_subject: String,
    timeout: Duration,
}

impl Mailer {
    pub fn new(config: &MailConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            transport,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            to_email: config.to_email.clone(),
            default_subject: config.default_subject.clone(),
            timeout: config.timeout(),
        }
    }

    /// Build the email for a submission.
    pub fn compose(&self, submission: &Submission) -> OutboundMail {
        OutboundMail {
            from_email: self.from_email.clone(),
            from_name: self.from_name.clone(),
            to_email: self.to_email.clone(),
            subject: submission.subject_or(&self.default_subject).to_string(),
            text: compose_body(submission),
            attachment: submission.attachment.clone(),
        }
    }

    /// Send one email for `submission`. No retries.
    pub async fn send(&self, submission: &Submission) -> Result<(), MailError> {
        let mail = self.compose(submission);
        let transport = self.transport.name();

        match tokio::time::timeout(self.timeout, self.transport.send(&mail)).await {
            Ok(Ok(())) => {
                info!(
                    transport,
                    to = %mail.to_email,
                    attachment_bytes = mail.attachment.as_ref().map_or(0, Attachment::len),
                    "Enrolment email sent"
                );
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(transport, error = %err, "Enrolment email failed");
                Err(err)
            }
            Err(_) => {
                warn!(transport, timeout = ?self.timeout, "Enrolment email timed out");
                Err(MailError::Timeout(self.timeout))
            }
        }
    }
}
