use thiserror::Error;

/// Errors raised by the lock service.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock could not be acquired within the wait time.
    #[error("Timed out acquiring lock: {key}")]
    Timeout { key: String },

    /// The lock backend failed.
    #[error("Lock backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

impl LockError {
    /// Returns true if trying again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
