// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mail transports: an SMTP relay and an HTTP mail API.

use crate::config::{MailApiConfig, MailConfig, MailTransportKind, SmtpConfig};
use crate::mailer::{MailError, MailTransport, OutboundMail};
use crate::submission::DEFAULT_CONTENT_TYPE;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Build the transport selected by configuration.
///
/// # Errors
/// Returns error if the selected transport is missing required settings.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn MailTransport>, MailError> {
    let transport: Arc<dyn MailTransport> = match config.transport {
        MailTransportKind::Smtp => Arc::new(SmtpTransport::new(&config.smtp, config.timeout())?),
        MailTransportKind::Http => Arc::new(HttpApiTransport::new(&config.api, config.timeout())?),
    };
    Ok(transport)
}

/// SMTP relay transport.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Create a relay client. Implicit TLS when `secure`, STARTTLS otherwise.
    ///
    /// # Errors
    /// Returns error if no host is configured or TLS setup fails.
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self, MailError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| MailError::Build("SMTP_HOST is not set".to_string()))?;

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };

        let mut builder = builder.port(config.port).timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        debug!(host, port = config.port, secure = config.secure, "Configured SMTP transport");
        Ok(Self {
            inner: builder.build(),
        })
    }
}

/// Convert an outbound mail into a MIME message.
pub fn to_message(mail: &OutboundMail) -> Result<Message, MailError> {
    let from = Mailbox::new(Some(mail.from_name.clone()), parse_address(&mail.from_email)?);
    let to = Mailbox::new(None, parse_address(&mail.to_email)?);

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(mail.subject.clone());
    let text = SinglePart::plain(mail.text.clone());

    let message = match &mail.attachment {
        Some(attachment) => {
            let content_type = ContentType::parse(&attachment.content_type)
                .or_else(|_| ContentType::parse(DEFAULT_CONTENT_TYPE))
                .map_err(|e| MailError::Build(e.to_string()))?;
            let part = MimeAttachment::new(attachment.filename.clone())
                .body(attachment.data.to_vec(), content_type);
            builder.multipart(MultiPart::mixed().singlepart(text).singlepart(part))
        }
        None => builder.singlepart(text),
    };

    message.map_err(|e| MailError::Build(e.to_string()))
}

fn parse_address(address: &str) -> Result<lettre::Address, MailError> {
    address
        .parse()
        .map_err(|e: lettre::address::AddressError| MailError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let message = to_message(mail)?;
        self.inner.send(message).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[derive(Debug, Serialize)]
struct ApiMail<'a> {
    personalizations: [ApiPersonalization<'a>; 1],
    from: ApiAddress<'a>,
    subject: &'a str,
    content: [ApiContent<'a>; 1],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ApiAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiPersonalization<'a> {
    to: [ApiAddress<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ApiAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ApiContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiAttachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    disposition: &'static str,
}

impl<'a> ApiMail<'a> {
    fn from_outbound(mail: &'a OutboundMail) -> Self {
        Self {
            personalizations: [ApiPersonalization {
                to: [ApiAddress {
                    email: &mail.to_email,
                    name: None,
                }],
            }],
            from: ApiAddress {
                email: &mail.from_email,
                name: Some(&mail.from_name),
            },
            subject: &mail.subject,
            content: [ApiContent {
                kind: "text/plain",
                value: &mail.text,
            }],
            attachments: mail
                .attachment
                .iter()
                .map(|a| ApiAttachment {
                    content: STANDARD.encode(&a.data),
                    filename: &a.filename,
                    kind: &a.content_type,
                    disposition: "attachment",
                })
                .collect(),
        }
    }
}

/// JSON mail API transport (MailChannels `tx/v1/send` format).
pub struct HttpApiTransport {
    endpoint: url::Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpApiTransport {
    /// # Errors
    /// Returns error if the endpoint is not a URL or the client cannot be built.
    pub fn new(config: &MailApiConfig, timeout: Duration) -> Result<Self, MailError> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| MailError::Build(format!("invalid mail API URL: {e}")))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint,
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl MailTransport for HttpApiTransport {
    async fn send(&self, mail: &OutboundMail) -> Result<(), MailError> {
        let body = ApiMail::from_outbound(mail);
        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(%status, "Mail API rejected message");
            return Err(MailError::Rejected(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::Attachment;
    use axum::body::Bytes;

    fn mail(attachment: Option<Attachment>) -> OutboundMail {
        OutboundMail {
            from_email: "no-reply@solartantra.com".to_string(),
            from_name: "Solartantra".to_string(),
            to_email: "contact@solartantra.com".to_string(),
            subject: "New Solartantra enrolment".to_string(),
            text: "New enrolment received.\n".to_string(),
            attachment,
        }
    }

    #[test]
    fn test_message_without_attachment() {
        let message = to_message(&mail(None)).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: New Solartantra enrolment"));
        assert!(raw.contains("New enrolment received."));
    }

    #[test]
    fn test_message_with_attachment_is_multipart() {
        let message = to_message(&mail(Some(Attachment {
            filename: "bill.pdf".to_string(),
            content_type: "not a mime type".to_string(),
            data: Bytes::from_static(b"%PDF-1.4"),
        })))
        .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("bill.pdf"));
        assert!(raw.contains("application/octet-stream"));
    }

    #[test]
    fn test_invalid_sender_is_construction_error() {
        let mut bad = mail(None);
        bad.from_email = "not-an-address".to_string();

        let err = to_message(&bad).unwrap_err();
        assert!(err.is_construction_error());
    }

    #[test]
    fn test_api_payload_shape() {
        let outbound = mail(Some(Attachment {
            filename: "bill.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"abc"),
        }));
        let json = serde_json::to_value(ApiMail::from_outbound(&outbound)).unwrap();

        assert_eq!(json["personalizations"][0]["to"][0]["email"], "contact@solartantra.com");
        assert_eq!(json["from"]["name"], "Solartantra");
        assert_eq!(json["content"][0]["type"], "text/plain");
        assert_eq!(json["attachments"][0]["content"], "YWJj");
        assert_eq!(json["attachments"][0]["disposition"], "attachment");
    }

    #[test]
    fn test_api_payload_omits_empty_attachments() {
        let outbound = mail(None);
        let json = serde_json::to_value(ApiMail::from_outbound(&outbound)).unwrap();
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_smtp_requires_host() {
        let result = SmtpTransport::new(&SmtpConfig::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(MailError::Build(_))));
    }
}
