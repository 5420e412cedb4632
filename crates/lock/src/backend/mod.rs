//! Storage for lock state.

mod memory;
mod redis_backend;

pub use memory::InMemoryLockBackend;
pub use redis_backend::RedisLockBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Atomic lock primitives keyed by resource name.
///
/// `token` identifies the holder. Every acquire is a single non-blocking
/// attempt; waiting is the service's job.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Takes the exclusive lock if nobody holds it, reader or writer.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool>;

    /// Releases the exclusive lock if `token` still holds it.
    async fn release(&self, key: &str, token: &str) -> Result<bool>;

    /// Joins the readers of `key` unless a writer holds it.
    async fn try_acquire_shared(&self, key: &str, token: &str, lease: Duration) -> Result<bool>;

    /// Leaves the readers of `key`.
    async fn release_shared(&self, key: &str, token: &str) -> Result<bool>;

    /// True while any live holder, reader or writer, exists.
    async fn is_locked(&self, key: &str) -> Result<bool>;
}
