use common::{CustomerId, MenuId, OrderId, StoreId};
use domain::{CartError, OrderError};
use lock::LockError;
use saga::SagaError;
use store::StoreError;
use thiserror::Error;

use crate::external::ExternalError;

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    /// The mutation broke a cart rule; nothing was changed.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Neither the cache nor durable storage could serve the cart.
    #[error("Cart storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

/// Errors from the order lifecycle engine.
#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// Invalid input or a move the status machine rejects.
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Cart(#[from] CartServiceError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("Cart holds items from store {cart_store}, not {requested}")]
    StoreMismatch {
        cart_store: StoreId,
        requested: StoreId,
    },

    /// The authoritative price could not be fetched. Orders are never
    /// created with unverified prices.
    #[error("Menu price unavailable for {menu_id}: {source}")]
    PricingUnavailable {
        menu_id: MenuId,
        #[source]
        source: ExternalError,
    },

    #[error("Customer check unavailable: {0}")]
    CustomerCheckUnavailable(#[source] ExternalError),

    #[error("Points reservation failed: {0}")]
    PointsReservation(#[source] ExternalError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Saga(#[from] SagaError),

    /// Another writer kept changing the order between read and write.
    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(OrderId),

    #[error("Could not allocate a unique order number")]
    OrderNumberExhausted,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl OrderServiceError {
    /// True if the same call may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderServiceError::Lock(e) => e.is_retryable(),
            OrderServiceError::ConcurrentModification(_)
            | OrderServiceError::PricingUnavailable { .. }
            | OrderServiceError::CustomerCheckUnavailable(_)
            | OrderServiceError::Storage(_)
            | OrderServiceError::Cart(CartServiceError::Storage(_)) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrderServiceError>;
