//! Volatile key/value tier used in front of durable storage.

mod memory;
mod redis_cache;

pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Result;

/// A string key/value cache with per-entry expiry.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to share
/// across tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Liveness probe. Returns `false` instead of erroring, and never waits
    /// longer than one bounded round trip.
    async fn ping(&self) -> bool;

    /// Reads a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Removes a value. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// JSON helpers on top of [`CacheStore`].
#[async_trait]
pub trait CacheStoreExt: CacheStore {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set_ex(key, &raw, ttl).await
    }
}

impl<S: CacheStore + ?Sized> CacheStoreExt for S {}
