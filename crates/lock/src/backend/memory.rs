use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::LockBackend;
use crate::Result;

#[derive(Default)]
struct Entry {
    writer: Option<(String, Instant)>,
    readers: HashMap<String, Instant>,
}

impl Entry {
    fn prune(&mut self, now: Instant) {
        if matches!(&self.writer, Some((_, expires_at)) if *expires_at <= now) {
            self.writer = None;
        }
        self.readers.retain(|_, expires_at| *expires_at > now);
    }

    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }
}

/// Process-local lock backend for tests and single-node runs.
#[derive(Clone, Default)]
pub struct InMemoryLockBackend {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockBackend for InMemoryLockBackend {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        entry.prune(now);

        if !entry.is_free() {
            return Ok(false);
        }
        entry.writer = Some((token.to_string(), now + lease));
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.prune(Instant::now());

        let held = matches!(&entry.writer, Some((holder, _)) if holder == token);
        if held {
            entry.writer = None;
        }
        if entry.is_free() {
            entries.remove(key);
        }
        Ok(held)
    }

    async fn try_acquire_shared(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        entry.prune(now);

        if entry.writer.is_some() {
            return Ok(false);
        }
        entry.readers.insert(token.to_string(), now + lease);
        Ok(true)
    }

    async fn release_shared(&self, key: &str, token: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(false);
        };
        entry.prune(Instant::now());

        let held = entry.readers.remove(token).is_some();
        if entry.is_free() {
            entries.remove(key);
        }
        Ok(held)
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        Ok(match entries.get_mut(key) {
            Some(entry) => {
                entry.prune(Instant::now());
                !entry.is_free()
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_exclusive_acquire_and_release() {
        let backend = InMemoryLockBackend::new();
        assert!(backend.try_acquire("k", "a", LEASE).await.unwrap());
        assert!(!backend.try_acquire("k", "b", LEASE).await.unwrap());

        // Only the holder releases
        assert!(!backend.release("k", "b").await.unwrap());
        assert!(backend.is_locked("k").await.unwrap());

        assert!(backend.release("k", "a").await.unwrap());
        assert!(!backend.is_locked("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires() {
        let backend = InMemoryLockBackend::new();
        assert!(backend.try_acquire("k", "a", LEASE).await.unwrap());

        tokio::time::advance(LEASE + Duration::from_millis(1)).await;

        assert!(!backend.is_locked("k").await.unwrap());
        assert!(backend.try_acquire("k", "b", LEASE).await.unwrap());
        // The expired holder can no longer release the new holder's lock
        assert!(!backend.release("k", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_readers_share_writers_exclude() {
        let backend = InMemoryLockBackend::new();
        assert!(backend.try_acquire_shared("k", "r1", LEASE).await.unwrap());
        assert!(backend.try_acquire_shared("k", "r2", LEASE).await.unwrap());
        assert!(!backend.try_acquire("k", "w", LEASE).await.unwrap());

        backend.release_shared("k", "r1").await.unwrap();
        backend.release_shared("k", "r2").await.unwrap();
        assert!(backend.try_acquire("k", "w", LEASE).await.unwrap());
        assert!(!backend.try_acquire_shared("k", "r3", LEASE).await.unwrap());
    }
}
