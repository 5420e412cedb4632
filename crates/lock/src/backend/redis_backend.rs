use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};
use tracing::info;

use super::LockBackend;
use crate::Result;

// KEYS[1] = writer key, KEYS[2] = reader set (score = expiry in ms, server clock)
const ACQUIRE_EXCLUSIVE: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', now)
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
if redis.call('ZCARD', KEYS[2]) > 0 then return 0 end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

const RELEASE_EXCLUSIVE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const ACQUIRE_SHARED: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
local lease = tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', now)
redis.call('ZADD', KEYS[2], now + lease, ARGV[1])
if redis.call('PTTL', KEYS[2]) < lease then
    redis.call('PEXPIRE', KEYS[2], lease)
end
return 1
"#;

const IS_LOCKED: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
if redis.call('EXISTS', KEYS[1]) == 1 then return 1 end
if redis.call('ZCOUNT', KEYS[2], '(' .. now, '+inf') > 0 then return 1 end
return 0
"#;

/// Redis lock backend.
///
/// The exclusive lock is a plain key set with `PX`; readers live in a sorted
/// set scored by their expiry. All checks run as Lua scripts so each
/// operation is atomic on the server.
#[derive(Clone)]
pub struct RedisLockBackend {
    conn: ConnectionManager,
}

impl RedisLockBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!(url = %url, "Connected to Redis for locks");

        Ok(Self { conn })
    }

    /// Builds a backend on an existing connection.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn readers_key(key: &str) -> String {
        format!("{key}:readers")
    }

    fn lease_millis(lease: Duration) -> u64 {
        lease.as_millis().max(1) as u64
    }
}

#[async_trait]
impl LockBackend for RedisLockBackend {
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acquired: i64 = Script::new(ACQUIRE_EXCLUSIVE)
            .key(key)
            .key(Self::readers_key(key))
            .arg(token)
            .arg(Self::lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_EXCLUSIVE)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn try_acquire_shared(&self, key: &str, token: &str, lease: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acquired: i64 = Script::new(ACQUIRE_SHARED)
            .key(key)
            .key(Self::readers_key(key))
            .arg(token)
            .arg(Self::lease_millis(lease))
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn release_shared(&self, key: &str, token: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(Self::readers_key(key))
            .arg(token)
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn is_locked(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let locked: i64 = Script::new(IS_LOCKED)
            .key(key)
            .key(Self::readers_key(key))
            .invoke_async(&mut conn)
            .await?;
        Ok(locked == 1)
    }
}
