//! Order fulfillment services.
//!
//! - [`CartService`]: per-customer carts, cache first with write-back to
//!   durable storage
//! - [`OrderService`]: turns carts into orders and drives the payment life
//!   cycle of each order
//! - [`external`]: peer services consulted for prices, customers and points

pub mod cart;
pub mod error;
pub mod external;
pub mod order;

pub use cart::CartService;
pub use error::{CartServiceError, OrderServiceError};
pub use external::{
    CustomerDirectory, ExternalConfig, ExternalError, HttpCustomerClient, HttpMenuPriceClient,
    InMemoryCustomerDirectory, InMemoryMenuCatalog, InMemoryPointsLedger, MenuPriceLookup,
    PointsLedger,
};
pub use order::{
    CreateOrderRequest, CustomerCheckPolicy, OrderService, OrderServiceConfig, OrderServiceDeps,
};
