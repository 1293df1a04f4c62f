// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the enrolment intake service.
//!
//! Every option has a default so the service starts with an empty
//! environment; values are read from environment variables by
//! [`Config::from_env`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Configuration for the enrolment intake service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Resolve the client IP from proxy headers instead of the peer address
    #[serde(default)]
    pub trust_proxy: bool,

    /// Origin allow-list
    #[serde(default)]
    pub cors: CorsConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upload limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// CAPTCHA verification
    #[serde(default)]
    pub captcha: CaptchaConfig,

    /// Outbound mail
    #[serde(default)]
    pub mail: MailConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Origin policy for browser submissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed to post the form, matched exactly
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Admit requests that carry no `Origin` header (default: false)
    #[serde(default)]
    pub allow_no_origin: bool,
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    /// Process-local map
    Memory,
    /// Shared Redis instance
    Redis,
    /// No limiting at all
    Disabled,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(format!("unknown rate limit backend {other:?}")),
        }
    }
}

/// Fixed-window rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Counter storage (default: memory)
    #[serde(default = "default_backend")]
    pub backend: RateLimitBackend,

    /// Redis URL, required by the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Window length in milliseconds (default: 15 minutes)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per client per window (default: 10)
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Prefix for store keys (default: "rate:")
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Interval between purges of expired in-memory entries (default: 60)
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Upload limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted attachment in bytes (default: 5 MiB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

/// CAPTCHA verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptchaConfig {
    /// Verification secret; verification is disabled when absent
    #[serde(default)]
    pub secret: Option<String>,

    /// Verification endpoint (default: Cloudflare Turnstile siteverify)
    #[serde(default = "default_verify_url")]
    pub verify_url: String,

    /// Timeout for the verification call in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Which transport relays the enrolment email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransportKind {
    /// SMTP relay
    Smtp,
    /// HTTP mail API
    Http,
}

impl FromStr for MailTransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smtp" => Ok(Self::Smtp),
            "http" | "api" => Ok(Self::Http),
            other => Err(format!("unknown mail transport {other:?}")),
        }
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Transport used to deliver mail (default: http)
    #[serde(default = "default_transport")]
    pub transport: MailTransportKind,

    /// Recipient of enrolment notifications
    #[serde(default = "default_to_email")]
    pub to_email: String,

    /// Sender address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// Sender display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Subject used when the form does not provide one
    #[serde(default = "default_subject")]
    pub default_subject: String,

    /// Timeout for a single send in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// SMTP relay settings
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// HTTP mail API settings
    #[serde(default)]
    pub api: MailApiConfig,
}

/// SMTP relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: Option<String>,

    /// Relay port (default: 587)
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Implicit TLS; STARTTLS is used when false
    #[serde(default)]
    pub secure: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// HTTP mail API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailApiConfig {
    /// Send endpoint (default: MailChannels transactional API)
    #[serde(default = "default_mail_api_url")]
    pub endpoint: String,

    /// Sent as `X-Api-Key` when present
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_backend() -> RateLimitBackend {
    RateLimitBackend::Memory
}

fn default_window_ms() -> u64 {
    15 * 60 * 1000
}

fn default_max_requests() -> u32 {
    10
}

fn default_key_prefix() -> String {
    "rate:".to_string()
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_max_file_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_verify_url() -> String {
    "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_transport() -> MailTransportKind {
    MailTransportKind::Http
}

fn default_to_email() -> String {
    "contact@solartantra.com".to_string()
}

fn default_from_email() -> String {
    "no-reply@solartantra.com".to_string()
}

fn default_from_name() -> String {
    "Solartantra".to_string()
}

fn default_subject() -> String {
    "New Solartantra enrolment".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_api_url() -> String {
    "https://api.mailchannels.net/tx/v1/send".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            trust_proxy: false,
            cors: CorsConfig::default(),
            rate_limit: RateLimitConfig::default(),
            upload: UploadConfig::default(),
            captcha: CaptchaConfig::default(),
            mail: MailConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: None,
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            key_prefix: default_key_prefix(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret: None,
            verify_url: default_verify_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            to_email: default_to_email(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            default_subject: default_subject(),
            timeout_ms: default_timeout_ms(),
            smtp: SmtpConfig::default(),
            api: MailApiConfig::default(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            secure: false,
            username: None,
            password: None,
        }
    }
}

impl Default for MailApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_mail_api_url(),
            api_key: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the rate window duration
    pub fn window_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Get the purge interval for the in-memory store
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl CaptchaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Empty values count as unset. Values that fail to parse keep their
    /// default and log a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let bind_addr = get("BIND_ADDR")
            .or_else(|| get("PORT").map(|port| format!("0.0.0.0:{}", port.trim())))
            .unwrap_or(defaults.bind_addr);

        let smtp_host = get("SMTP_HOST");
        let transport = parse_or(
            &get,
            "MAIL_TRANSPORT",
            if smtp_host.is_some() {
                MailTransportKind::Smtp
            } else {
                default_transport()
            },
        );

        Self {
            bind_addr,
            trust_proxy: parse_bool(&get, "TRUST_PROXY", false),
            cors: CorsConfig {
                allowed_origins: get("ALLOWED_ORIGINS")
                    .map(|raw| parse_origin_list(&raw))
                    .unwrap_or_default(),
                allow_no_origin: parse_bool(&get, "ALLOW_NO_ORIGIN", false),
            },
            rate_limit: RateLimitConfig {
                backend: parse_or(&get, "RATE_LIMIT_BACKEND", default_backend()),
                redis_url: get("REDIS_URL"),
                window_ms: parse_or(&get, "RATE_LIMIT_WINDOW_MS", default_window_ms()),
                max_requests: parse_or(&get, "RATE_LIMIT_MAX", default_max_requests()),
                key_prefix: get("RATE_LIMIT_KEY_PREFIX").unwrap_or_else(default_key_prefix),
                cleanup_interval_secs: defaults.rate_limit.cleanup_interval_secs,
            },
            upload: UploadConfig {
                max_file_bytes: parse_or(&get, "MAX_FILE_BYTES", default_max_file_bytes()),
            },
            captcha: CaptchaConfig {
                secret: get("TURNSTILE_SECRET"),
                verify_url: get("TURNSTILE_VERIFY_URL").unwrap_or_else(default_verify_url),
                timeout_ms: parse_or(&get, "CAPTCHA_TIMEOUT_MS", default_timeout_ms()),
            },
            mail: MailConfig {
                transport,
                to_email: get("TO_EMAIL").unwrap_or_else(default_to_email),
                from_email: get("FROM_EMAIL").unwrap_or_else(default_from_email),
                from_name: get("FROM_NAME").unwrap_or_else(default_from_name),
                default_subject: get("MAIL_SUBJECT").unwrap_or_else(default_subject),
                timeout_ms: parse_or(&get, "MAIL_TIMEOUT_MS", default_timeout_ms()),
                smtp: SmtpConfig {
                    host: smtp_host,
                    port: parse_or(&get, "SMTP_PORT", default_smtp_port()),
                    secure: parse_bool(&get, "SMTP_SECURE", false),
                    username: get("SMTP_USER"),
                    password: get("SMTP_PASS"),
                },
                api: MailApiConfig {
                    endpoint: get("MAIL_API_URL").unwrap_or_else(default_mail_api_url),
                    api_key: get("MAIL_API_KEY"),
                },
            },
            metrics: MetricsConfig {
                enabled: parse_bool(&get, "METRICS_ENABLED", default_true()),
                path: get("METRICS_PATH").unwrap_or_else(default_metrics_path),
            },
        }
    }
}

/// Split a comma-separated origin list, dropping blanks.
pub fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            default
        }),
        None => default,
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> bool
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                warn!(key, value = %raw, "Ignoring unparseable boolean");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.cors.allowed_origins.is_empty());
        assert!(!config.cors.allow_no_origin);
        assert_eq!(config.rate_limit.backend, RateLimitBackend::Memory);
        assert_eq!(config.rate_limit.window_duration(), Duration::from_secs(900));
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.upload.max_file_bytes, 5 * 1024 * 1024);
        assert!(config.captcha.secret.is_none());
        assert_eq!(config.mail.transport, MailTransportKind::Http);
        assert_eq!(config.mail.default_subject, "New Solartantra enrolment");
    }

    #[test]
    fn test_origin_list_is_trimmed() {
        let config = config_from(&[(
            "ALLOWED_ORIGINS",
            " https://solartantra.com, ,https://www.solartantra.com ,",
        )]);

        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://solartantra.com", "https://www.solartantra.com"]
        );
    }

    #[test]
    fn test_port_sets_bind_addr() {
        let config = config_from(&[("PORT", "3000")]);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");

        let config = config_from(&[("PORT", "3000"), ("BIND_ADDR", "127.0.0.1:9000")]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn test_smtp_host_selects_smtp_transport() {
        let config = config_from(&[("SMTP_HOST", "smtp.example.com"), ("SMTP_SECURE", "TRUE")]);
        assert_eq!(config.mail.transport, MailTransportKind::Smtp);
        assert!(config.mail.smtp.secure);
        assert_eq!(config.mail.smtp.port, 587);

        let config = config_from(&[("SMTP_HOST", "smtp.example.com"), ("MAIL_TRANSPORT", "http")]);
        assert_eq!(config.mail.transport, MailTransportKind::Http);
    }

    #[test]
    fn test_empty_secret_disables_captcha() {
        let config = config_from(&[("TURNSTILE_SECRET", "")]);
        assert!(config.captcha.secret.is_none());
    }

    #[test]
    fn test_invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("RATE_LIMIT_MAX", "lots"),
            ("RATE_LIMIT_WINDOW_MS", "1000"),
            ("RATE_LIMIT_BACKEND", "carrier-pigeon"),
        ]);

        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window_ms, 1000);
        assert_eq!(config.rate_limit.backend, RateLimitBackend::Memory);
    }
}
