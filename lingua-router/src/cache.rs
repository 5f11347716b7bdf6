//! # Cache Client
//!
//! Key/value store with per-entry TTL, used by the router for response
//! memoization and by the metrics aggregator for per-provider counters.
//!
//! Values are opaque byte blobs; callers do their own (de)serialization.
//! The cache is advisory throughout: every operation can fail, and every
//! caller treats a failure as a miss. Nothing in this crate lets a cache
//! error escape to the embedder.
//!
//! Two backends ship:
//!
//! - [`InMemoryCache`] — LRU-bounded local store, right for a single
//!   gateway instance and for tests.
//! - [`RedisCache`] — shared store for multi-instance deployments, TTL
//!   enforced server-side via `SETEX`.

use crate::error::CacheError;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key/value store with TTL. Values are opaque.
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Fetch a value. `Ok(None)` is a miss; expired entries are misses.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value for `ttl`. Overwrites and refreshes any prior entry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Drop a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct Entry {
    value: Vec<u8>,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Local LRU cache with per-entry expiry.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl InMemoryCache {
    /// `capacity` bounds the number of live entries; least recently used
    /// entries are evicted first.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.lock().unwrap().put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().unwrap().pop(key);
        Ok(())
    }
}

/// Redis-backed cache for deployments with more than one gateway node.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Build a client for `url` (e.g. `redis://localhost:6379`). The
    /// connection itself is established lazily per operation.
    pub fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        Ok(self.client.get_multiplexed_tokio_connection().await?)
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let ttl_seconds = ttl.as_secs().max(1);
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(&value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
