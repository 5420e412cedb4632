//! Shared types for the order-fulfillment workspace.

mod context;
mod ids;
mod money;

pub use context::{ContextError, RequestContext, UserType};
pub use ids::{CustomerId, MenuId, OrderId, PaymentId, StoreId};
pub use money::Money;
