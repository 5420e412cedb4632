use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{info, warn};

use super::CacheStore;
use crate::Result;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    probe_timeout: Duration,
}

impl RedisCache {
    /// Connects to Redis at `url`, e.g. `redis://localhost:6379`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis cache");

        Ok(Self {
            conn,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        })
    }

    /// Overrides how long [`CacheStore::ping`] waits for an answer.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// The underlying connection, shared with the Redis lock backend.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let mut ping_cmd = redis::cmd("PING");
        let probe = ping_cmd.query_async::<String>(&mut conn);
        let alive = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(reply)) => reply == "PONG",
            Ok(Err(e)) => {
                warn!(error = %e, "Redis ping failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.probe_timeout.as_millis() as u64,
                    "Redis ping timed out"
                );
                false
            }
        };
        if !alive {
            metrics::counter!("cache_probe_failures_total").increment(1);
        }
        alive
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let millis = ttl.as_millis().max(1) as u64;
        let _: () = conn.pset_ex(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
