// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Key-value stores holding rate-limit windows.
//!
//! The limiter only needs `get` and `put` with an expiry. Two backends are
//! provided:
//!
//! - [`MemoryStore`]: a process-local map, purged periodically
//! - [`RedisStore`]: a shared Redis instance, expiry handled by Redis TTLs

use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Counter for one client within one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    pub count: u32,
    #[serde(rename = "start")]
    pub window_start: DateTime<Utc>,
}

impl RateLimitEntry {
    /// First request of a new window.
    pub fn first(now: DateTime<Utc>) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    /// Same window, one more request.
    pub fn incremented(self) -> Self {
        Self {
            count: self.count.saturating_add(1),
            ..self
        }
    }
}

/// Store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Corrupt rate limit entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Storage for rate-limit entries.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Fetch the live entry for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError>;

    /// Write `entry` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, entry: RateLimitEntry, ttl: Duration) -> Result<(), StoreError>;

    /// Drop expired entries. Stores with native expiry do nothing.
    async fn purge_expired(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct StoredEntry {
    entry: RateLimitEntry,
    expires_at: DateTime<Utc>,
}

/// Process-local store.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|stored| now < stored.expires_at)
            .map(|stored| stored.entry))
    }

    async fn put(&self, key: &str, entry: RateLimitEntry, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = expiry(self.clock.now(), ttl);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), StoredEntry { entry, expires_at });
        Ok(())
    }

    async fn purge_expired(&self) {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| now < stored.expires_at);
        debug!(purged = before.saturating_sub(entries.len()), "Purged expired rate limit entries");
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Redis-backed store shared between instances.
///
/// Entries are JSON (`{"count":..,"start":..}`) written with `SET .. EX`,
/// the TTL rounded up to whole seconds.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl RateLimitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn put(&self, key: &str, entry: RateLimitEntry, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let value = serde_json::to_string(&entry)?;
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }
}

/// Whole seconds for a Redis TTL, rounded up and never zero.
fn ttl_secs(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis().div_ceil(1000))
        .unwrap_or(u64::MAX)
        .max(1)
}
