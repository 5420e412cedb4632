//! The lock service: waiting, scoping and multi-key acquisition.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{LockBackend, LockError, Result};

const KEY_PREFIX: &str = "lock:";
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Whether a handle holds a lock alone or shares it with other readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Exclusive,
    Shared,
}

/// Proof of holding a lock.
///
/// Only [`DistributedLockService::unlock`] consumes it, so code can only
/// release locks it actually acquired. Dropping a handle without unlocking
/// leaves the lock to expire with its lease.
#[derive(Debug)]
#[must_use = "a dropped handle keeps the lock until its lease expires"]
pub struct LockHandle {
    key: String,
    token: String,
    lease: Duration,
    mode: LockMode,
}

impl LockHandle {
    /// The resource key, without the internal prefix.
    pub fn key(&self) -> &str {
        self.key.strip_prefix(KEY_PREFIX).unwrap_or(&self.key)
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

/// Lease-based lock service over a [`LockBackend`].
#[derive(Clone)]
pub struct DistributedLockService {
    backend: Arc<dyn LockBackend>,
    retry_interval: Duration,
}

impl DistributedLockService {
    pub fn new(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Sets how often a waiting acquisition polls the backend.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    fn full_key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Single non-blocking attempt at the exclusive lock.
    pub async fn try_lock(&self, key: &str, lease: Duration) -> Result<Option<LockHandle>> {
        self.attempt(Self::full_key(key), lease, LockMode::Exclusive)
            .await
    }

    /// Waits up to `wait` for the exclusive lock.
    pub async fn lock(&self, key: &str, wait: Duration, lease: Duration) -> Result<LockHandle> {
        self.acquire(Self::full_key(key), wait, lease, LockMode::Exclusive)
            .await
    }

    /// Releases a lock held through `handle`.
    ///
    /// Returns `false` if the lease had already lapsed, in which case the
    /// lock may now belong to someone else and is left alone.
    pub async fn unlock(&self, handle: LockHandle) -> Result<bool> {
        let released = match handle.mode {
            LockMode::Exclusive => self.backend.release(&handle.key, &handle.token).await?,
            LockMode::Shared => {
                self.backend
                    .release_shared(&handle.key, &handle.token)
                    .await?
            }
        };

        if released {
            debug!(key = %handle.key, "Lock released");
        } else {
            warn!(key = %handle.key, "Lock lease expired before release");
            metrics::counter!("lock_lease_expired_total").increment(1);
        }
        Ok(released)
    }

    /// True while anyone holds `key`.
    pub async fn is_locked(&self, key: &str) -> Result<bool> {
        self.backend.is_locked(&Self::full_key(key)).await
    }

    /// Runs `f` while holding the exclusive lock on `key`.
    ///
    /// The lock is released when `f` finishes, whatever it returns. If the
    /// lock cannot be acquired within `wait`, `f` never runs and the
    /// [`LockError::Timeout`] is returned through `E`.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self.lock(key, wait, lease).await?;
        let outcome = f().await;
        self.release_quietly(handle).await;
        outcome
    }

    /// Runs `f` while holding the exclusive locks on all `keys`.
    ///
    /// Keys are taken in sorted order so two callers locking overlapping
    /// groups cannot deadlock. Either every key is acquired within `wait` or
    /// none stays held.
    pub async fn with_multi_lock<F, Fut, T, E>(
        &self,
        keys: &[&str],
        wait: Duration,
        lease: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let mut sorted: Vec<&str> = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let deadline = Instant::now() + wait;
        let mut handles = Vec::with_capacity(sorted.len());
        for key in sorted {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self
                .acquire(Self::full_key(key), remaining, lease, LockMode::Exclusive)
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        self.release_quietly(handle).await;
                    }
                    return Err(e.into());
                }
            }
        }

        let outcome = f().await;
        for handle in handles {
            self.release_quietly(handle).await;
        }
        outcome
    }

    /// Runs `f` as one of possibly many concurrent readers of `key`.
    pub async fn with_read_lock<F, Fut, T, E>(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self
            .acquire(Self::full_key(key), wait, lease, LockMode::Shared)
            .await?;
        let outcome = f().await;
        self.release_quietly(handle).await;
        outcome
    }

    /// Runs `f` as the only writer of `key`, with no readers present.
    pub async fn with_write_lock<F, Fut, T, E>(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<LockError>,
    {
        self.with_lock(key, wait, lease, f).await
    }

    async fn attempt(
        &self,
        key: String,
        lease: Duration,
        mode: LockMode,
    ) -> Result<Option<LockHandle>> {
        let token = Uuid::new_v4().to_string();
        let acquired = match mode {
            LockMode::Exclusive => self.backend.try_acquire(&key, &token, lease).await?,
            LockMode::Shared => self.backend.try_acquire_shared(&key, &token, lease).await?,
        };

        if !acquired {
            return Ok(None);
        }
        debug!(key = %key, ?mode, "Lock acquired");
        Ok(Some(LockHandle {
            key,
            token,
            lease,
            mode,
        }))
    }

    async fn acquire(
        &self,
        key: String,
        wait: Duration,
        lease: Duration,
        mode: LockMode,
    ) -> Result<LockHandle> {
        let started = Instant::now();
        let deadline = started + wait;

        loop {
            if let Some(handle) = self.attempt(key.clone(), lease, mode).await? {
                metrics::histogram!("lock_wait_seconds").record(started.elapsed().as_secs_f64());
                return Ok(handle);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(key = %key, wait_ms = wait.as_millis() as u64, "Failed to acquire lock");
                metrics::counter!("lock_timeouts_total").increment(1);
                return Err(LockError::Timeout {
                    key: key
                        .strip_prefix(KEY_PREFIX)
                        .unwrap_or(&key)
                        .to_string(),
                });
            }
            tokio::time::sleep(self.retry_interval.min(deadline - now)).await;
        }
    }

    async fn release_quietly(&self, handle: LockHandle) {
        let key = handle.key.clone();
        if let Err(e) = self.unlock(handle).await {
            // The lease still bounds how long the key stays locked
            warn!(key = %key, error = %e, "Failed to release lock");
        }
    }
}
