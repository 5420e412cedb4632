//! Domain layer for order fulfillment.
//!
//! This crate holds the pure models, free of any I/O:
//! - Cart lines and the rules every cart mutation must satisfy
//! - The order snapshot created from a cart, with its pricing
//! - The order status machine driven by payment outcomes

pub mod cart;
pub mod order;

pub use cart::{AddCartItem, Cart, CartError, CartItem};
pub use order::{
    Fulfillment, NewOrder, Order, OrderError, OrderLine, OrderNumber, OrderRecord, OrderStatus,
    OrderType, PaymentOutcome, Transition,
};
