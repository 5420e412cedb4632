//! Value objects for the order domain.

use chrono::NaiveDate;
use common::{MenuId, Money};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Human-shareable order number, e.g. `ORD-20241215-3FA9C`.
///
/// The random suffix alone does not make collisions impossible; the order
/// table carries a unique index and creation retries on a collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    const PREFIX: &'static str = "ORD";
    const SUFFIX_LEN: usize = 5;

    /// Generates a fresh order number for the given date.
    pub fn generate(date: NaiveDate) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        let suffix = random[..Self::SUFFIX_LEN].to_ascii_uppercase();
        Self(format!(
            "{}-{}-{}",
            Self::PREFIX,
            date.format("%Y%m%d"),
            suffix
        ))
    }

    /// Wraps an existing order number, e.g. one read from storage or a URL.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the customer receives the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Delivery,
    Pickup,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Delivery => "DELIVERY",
            OrderType::Pickup => "PICKUP",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "DELIVERY" => Some(OrderType::Delivery),
            "PICKUP" => Some(OrderType::Pickup),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery or pickup details captured with the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fulfillment {
    Delivery {
        address: String,
        requests: Option<String>,
    },
    Pickup {
        requests: Option<String>,
    },
}

impl Fulfillment {
    pub fn order_type(&self) -> OrderType {
        match self {
            Fulfillment::Delivery { .. } => OrderType::Delivery,
            Fulfillment::Pickup { .. } => OrderType::Pickup,
        }
    }
}

/// A priced line of an order.
///
/// The unit price is the authoritative catalog price at creation time and
/// never follows later catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub menu_id: MenuId,
    pub menu_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(
        menu_id: MenuId,
        menu_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            menu_id,
            menu_name: menu_name.into(),
            quantity,
            unit_price,
        }
    }

    /// Returns `unit_price * quantity`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
