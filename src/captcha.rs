// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! CAPTCHA token verification against a siteverify endpoint.

use crate::config::CaptchaConfig;
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies CAPTCHA tokens. Disabled when no secret is configured.
#[derive(Clone)]
pub struct CaptchaVerifier {
    secret: Option<String>,
    verify_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for CaptchaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaVerifier")
            .field("enabled", &self.is_enabled())
            .field("verify_url", &self.verify_url)
            .finish()
    }
}

impl CaptchaVerifier {
    /// Create a verifier with the configured timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &CaptchaConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            verify_url: config.verify_url.clone(),
            client,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check `token` with the verification service.
    ///
    /// Always true when disabled. With a secret configured, a missing token
    /// fails without a network call; transport errors, non-success statuses
    /// and unreadable bodies all count as failed verification.
    pub async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> bool {
        let Some(secret) = &self.secret else {
            return true;
        };
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            debug!("No captcha token supplied");
            return false;
        };

        let mut form = vec![("secret", secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let response = match self.client.post(&self.verify_url).form(&form).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "Captcha verification request failed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Captcha service returned error status");
            return false;
        }

        match response.json::<SiteVerifyResponse>().await {
            Ok(result) if result.success => true,
            Ok(result) => {
                info!(error_codes = ?result.error_codes, "Captcha token rejected");
                false
            }
            Err(err) => {
                warn!(error = %err, "Unreadable captcha verification response");
                false
            }
        }
    }
}
