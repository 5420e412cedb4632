//! Order entity and related types.

mod model;
mod status;
mod value_objects;

pub use model::{NewOrder, Order, OrderRecord, PaymentOutcome};
pub use status::{OrderStatus, Transition};
pub use value_objects::{Fulfillment, OrderLine, OrderNumber, OrderType};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    /// The cart had no lines to turn into an order.
    #[error("Cart is empty")]
    EmptyCart,

    /// Points to use must not be negative.
    #[error("Invalid points: {points} (must not be negative)")]
    InvalidPoints { points: i64 },

    #[error("Delivery orders require a delivery address")]
    MissingDeliveryAddress,

    /// Order is not in a state that allows the requested action.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    #[error("Unknown order status code: {0}")]
    UnknownStatus(String),

    #[error("Unknown order type: {0}")]
    UnknownOrderType(String),
}
