//! Storage layer for the order-fulfillment services.
//!
//! - [`CacheStore`]: the volatile key/value tier with a liveness probe
//! - [`CartRepository`]: durable per-customer carts
//! - [`OrderRepository`]: durable orders with a unique order number index
//! - [`SoftDelete`]: soft-delete capability shared by repositories
//!
//! Each trait has an in-memory implementation for tests and local runs, and a
//! networked one (Redis for the cache, PostgreSQL for durable storage).

pub mod cache;
pub mod cart;
pub mod error;
pub mod order;
pub mod postgres;
pub mod soft_delete;

pub use cache::{CacheStore, CacheStoreExt, InMemoryCache, RedisCache};
pub use cart::{CartRepository, InMemoryCartRepository};
pub use error::{Result, StoreError};
pub use order::{InMemoryOrderRepository, OrderRepository};
pub use postgres::{PostgresCartRepository, PostgresOrderRepository, run_migrations};
pub use soft_delete::SoftDelete;
