//! Wires storage, locks and peer clients from configuration.

use std::sync::Arc;

use lock::{DistributedLockService, InMemoryLockBackend, LockBackend, RedisLockBackend};
use ordering::{
    CartService, ExternalError, HttpCustomerClient, HttpMenuPriceClient, OrderService,
    OrderServiceConfig, OrderServiceDeps,
};
use sqlx::postgres::PgPoolOptions;
use store::{
    CacheStore, CartRepository, InMemoryCache, InMemoryCartRepository, InMemoryOrderRepository,
    OrderRepository, PostgresCartRepository, PostgresOrderRepository, RedisCache, StoreError,
    run_migrations,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::AppState;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Storage setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client setup failed: {0}")]
    External(#[from] ExternalError),

    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Builds the application state. Redis and PostgreSQL are used when their
/// URLs are configured; otherwise everything stays in memory.
pub async fn build_state(config: &Config) -> Result<AppState, BootstrapError> {
    let (cache, locks): (Arc<dyn CacheStore>, Arc<dyn LockBackend>) = match &config.redis_url {
        Some(url) => {
            let cache = RedisCache::connect(url).await?;
            let locks = RedisLockBackend::from_connection(cache.connection());
            (Arc::new(cache), Arc::new(locks))
        }
        None => {
            warn!("REDIS_URL not set; cart cache and locks are process-local");
            (
                Arc::new(InMemoryCache::new()),
                Arc::new(InMemoryLockBackend::new()),
            )
        }
    };

    let (orders, carts): (Arc<dyn OrderRepository>, Arc<dyn CartRepository>) =
        match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
                run_migrations(&pool).await?;
                info!("Connected to PostgreSQL");
                (
                    Arc::new(PostgresOrderRepository::new(pool.clone())),
                    Arc::new(PostgresCartRepository::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set; orders and carts are kept in memory");
                (
                    Arc::new(InMemoryOrderRepository::new()),
                    Arc::new(InMemoryCartRepository::new()),
                )
            }
        };

    let external = config.external();
    let client = external.build_client()?;
    let customers = Arc::new(HttpCustomerClient::new(
        client.clone(),
        &external.customer_service_url,
    ));

    let order_service = OrderService::new(
        OrderServiceDeps {
            orders,
            carts: CartService::with_ttl(cache.clone(), carts, config.cart_ttl),
            prices: Arc::new(HttpMenuPriceClient::new(client, &external.store_service_url)),
            customers: customers.clone(),
            points: customers,
            locks: DistributedLockService::new(locks),
        },
        OrderServiceConfig {
            lock_wait: config.payment_lock_wait,
            lock_lease: config.payment_lock_lease,
            customer_check: config.customer_check,
            ..OrderServiceConfig::default()
        },
    );

    Ok(AppState {
        orders: order_service,
        cache,
        trusted_service: config.trusted_service_name.clone(),
    })
}
