// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Enrolment submissions and their extraction from multipart bodies.

use crate::error::IntakeError;
use axum::body::Bytes;
use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tracing::debug;

/// Multipart field carrying the electricity bill photo.
pub const ATTACHMENT_FIELD: &str = "billPhoto";

const DEFAULT_ATTACHMENT_NAME: &str = "attachment";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file uploaded with the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl Attachment {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One enrolment form post. Lives for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub consumer_name: String,
    pub consumer_number: String,
    pub consumer_address: String,
    pub postal_code: String,
    pub phone_number: String,
    /// Blank when the form did not provide one
    pub subject: String,
    pub captcha_token: Option<String>,
    pub attachment: Option<Attachment>,
}

impl Submission {
    /// Subject to use for the outgoing mail.
    pub fn subject_or<'a>(&'a self, default: &'a str) -> &'a str {
        let subject = self.subject.trim();
        if subject.is_empty() {
            default
        } else {
            subject
        }
    }

    /// Read a submission from a multipart body.
    ///
    /// Unknown fields are skipped. The attachment is streamed and rejected
    /// as soon as it grows past `max_file_bytes`, without buffering the rest.
    pub async fn from_multipart(
        mut multipart: Multipart,
        max_file_bytes: usize,
    ) -> Result<Self, IntakeError> {
        let mut submission = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(ToString::to_string) else {
                continue;
            };

            match name.as_str() {
                "consumerName" => submission.consumer_name = field.text().await.map_err(malformed)?,
                "consumerNumber" => {
                    submission.consumer_number = field.text().await.map_err(malformed)?
                }
                "consumerAddress" => {
                    submission.consumer_address = field.text().await.map_err(malformed)?
                }
                "postalCode" => submission.postal_code = field.text().await.map_err(malformed)?,
                "phoneNumber" => submission.phone_number = field.text().await.map_err(malformed)?,
                "subject" => submission.subject = field.text().await.map_err(malformed)?,
                "captchaToken" => {
                    let token = field.text().await.map_err(malformed)?;
                    submission.captcha_token = Some(token).filter(|t| !t.trim().is_empty());
                }
                ATTACHMENT_FIELD => {
                    submission.attachment = read_attachment(field, max_file_bytes).await?;
                }
                other => debug!(field = %other, "Skipping unknown form field"),
            }
        }

        Ok(submission)
    }
}

async fn read_attachment(
    mut field: Field<'_>,
    max_file_bytes: usize,
) -> Result<Option<Attachment>, IntakeError> {
    let filename = field
        .file_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToString::to_string);
    let content_type = field
        .content_type()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string();

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
        if data.len().saturating_add(chunk.len()) > max_file_bytes {
            debug!(max_file_bytes, "Attachment exceeds size limit");
            return Err(IntakeError::ValidationFailed(vec![format!(
                "{ATTACHMENT_FIELD} must be at most {max_file_bytes} bytes"
            )]));
        }
        data.extend_from_slice(&chunk);
    }

    // Browsers send an empty part when no file was chosen.
    if data.is_empty() {
        debug!(filename = ?filename, "Ignoring empty attachment part");
        return Ok(None);
    }

    Ok(Some(Attachment {
        filename: filename.unwrap_or_else(|| DEFAULT_ATTACHMENT_NAME.to_string()),
        content_type,
        data: Bytes::from(data),
    }))
}

fn malformed(err: MultipartError) -> IntakeError {
    debug!(error = %err, "Unreadable multipart body");
    let detail = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        "request body is too large"
    } else {
        "request body is not valid multipart form data"
    };
    IntakeError::ValidationFailed(vec![detail.to_string()])
}
