// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter keyed by client IP.
//!
//! The first request from a client opens a window and each later request
//! inside it bumps the counter until `max_requests` is reached. Once the
//! window has elapsed the next request opens a fresh one.
//!
//! The limiter fails open: with no store configured, or when the store
//! errors, requests are admitted.

use crate::clock::{Clock, SystemClock};
use crate::config::{RateLimitBackend, RateLimitConfig};
use crate::store::{MemoryStore, RateLimitEntry, RateLimitStore, RedisStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed
    Allowed {
        /// Remaining requests in current window
        remaining: u32,
        /// Time until window resets
        reset_in: Duration,
    },
    /// Request is rate limited
    Limited {
        /// Time until the window resets
        retry_after: Duration,
    },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Per-client fixed-window limiter over a pluggable store.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Option<Arc<dyn RateLimitStore>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over the given store and clock.
    pub fn new(
        config: RateLimitConfig,
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store: Some(store),
            clock,
        }
    }

    /// Limiter backed by a process-local map and the system clock.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::new(config, store, clock)
    }

    /// Limiter that admits everything.
    pub fn disabled(config: RateLimitConfig) -> Self {
        Self {
            config,
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build the limiter selected by configuration.
    ///
    /// A redis backend without a URL, or whose server cannot be reached,
    /// falls back to a disabled limiter.
    pub async fn from_config(config: RateLimitConfig) -> Self {
        match config.backend {
            RateLimitBackend::Memory => Self::in_memory(config),
            RateLimitBackend::Disabled => Self::disabled(config),
            RateLimitBackend::Redis => {
                let Some(url) = config.redis_url.clone() else {
                    warn!("Redis rate limiting selected without REDIS_URL, limiter disabled");
                    return Self::disabled(config);
                };
                match RedisStore::connect(&url).await {
                    Ok(store) => Self::new(config, Arc::new(store), Arc::new(SystemClock)),
                    Err(err) => {
                        warn!(error = %err, "Cannot reach Redis, limiter disabled");
                        Self::disabled(config)
                    }
                }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Requests admitted per client per window.
    pub fn max_requests(&self) -> u32 {
        self.config.max_requests
    }

    /// Record a request from `client` and decide whether it may proceed.
    pub async fn check_and_increment(&self, client: &str) -> RateLimitResult {
        let window = self.config.window_duration();
        let Some(store) = &self.store else {
            return RateLimitResult::Allowed {
                remaining: self.config.max_requests,
                reset_in: window,
            };
        };

        let key = format!("{}{}", self.config.key_prefix, client);
        match self.apply(store.as_ref(), &key, window).await {
            Ok(result) => result,
            Err(err) => {
                warn!(%client, error = %err, "Rate limit store unavailable, admitting request");
                RateLimitResult::Allowed {
                    remaining: self.config.max_requests,
                    reset_in: window,
                }
            }
        }
    }

    async fn apply(
        &self,
        store: &dyn RateLimitStore,
        key: &str,
        window: Duration,
    ) -> Result<RateLimitResult, StoreError> {
        let now = self.clock.now();
        let max = self.config.max_requests;

        let current = store
            .get(key)
            .await?
            .map(|entry| (entry, elapsed_since(entry, now)))
            .filter(|(_, elapsed)| *elapsed < window);

        let Some((entry, elapsed)) = current else {
            if max == 0 {
                return Ok(RateLimitResult::Limited {
                    retry_after: window,
                });
            }
            store.put(key, RateLimitEntry::first(now), window).await?;
            debug!(%key, "Opened rate limit window");
            return Ok(RateLimitResult::Allowed {
                remaining: max.saturating_sub(1),
                reset_in: window,
            });
        };

        let reset_in = window.saturating_sub(elapsed);
        if entry.count >= max {
            debug!(%key, count = entry.count, ?reset_in, "Rate limit exceeded");
            return Ok(RateLimitResult::Limited {
                retry_after: reset_in,
            });
        }

        let next = entry.incremented();
        store.put(key, next, reset_in).await?;
        Ok(RateLimitResult::Allowed {
            remaining: max.saturating_sub(next.count),
            reset_in,
        })
    }

    /// Clean up expired entries (should be called periodically).
    pub async fn cleanup(&self) {
        if let Some(store) = &self.store {
            store.purge_expired().await;
        }
    }
}

fn elapsed_since(entry: RateLimitEntry, now: chrono::DateTime<chrono::Utc>) -> Duration {
    now.signed_duration_since(entry.window_start)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
