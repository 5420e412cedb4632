use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the cache or durable storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cache tier reported an error.
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// The cache tier did not answer its liveness probe.
    #[error("Cache unavailable")]
    CacheUnavailable,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another order already uses this order number.
    #[error("Order number already exists: {0}")]
    DuplicateOrderNumber(String),

    /// An order with this id was already inserted.
    #[error("Order already exists: {0}")]
    DuplicateOrderId(OrderId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The durable store is unreachable.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
