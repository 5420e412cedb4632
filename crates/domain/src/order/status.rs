//! Order status machine.

use serde::{Deserialize, Serialize};

/// The payment status of an order.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Paid ──────────► Cancelled
///           ├──► PaymentFailed
///           └──► Cancelled
/// ```
///
/// No state ever re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created from a cart, awaiting settlement by the payment authority.
    #[default]
    Pending,

    /// Payment settled.
    Paid,

    /// The payment authority reported a failure.
    PaymentFailed,

    /// Cancelled by the customer, the payment authority, or an administrator.
    Cancelled,
}

/// Result of asking the status machine to move to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changed.
    Applied,
    /// The order was already in the requested status; nothing changed.
    Unchanged,
    /// The move is not allowed; nothing changed.
    Rejected { from: OrderStatus, to: OrderStatus },
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

impl OrderStatus {
    /// Returns true if the machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Pending, OrderStatus::PaymentFailed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Paid, OrderStatus::Cancelled)
        )
    }

    /// Evaluates a move to `next` without applying it.
    ///
    /// `Paid -> Paid` is reported as [`Transition::Unchanged`] so repeated
    /// settlement callbacks succeed idempotently. Every other move into the
    /// current status, and every move the machine forbids, is rejected.
    pub fn transition_to(&self, next: OrderStatus) -> Transition {
        if *self == OrderStatus::Paid && next == OrderStatus::Paid {
            Transition::Unchanged
        } else if self.can_transition_to(next) {
            Transition::Applied
        } else {
            Transition::Rejected {
                from: *self,
                to: next,
            }
        }
    }

    /// Returns true once the payment outcome is resolved.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Returns the wire code for the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status code. Accepts the legacy `CANCELED` spelling.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(OrderStatus::Pending),
            "PAID" => Some(OrderStatus::Paid),
            "PAYMENT_FAILED" => Some(OrderStatus::PaymentFailed),
            "CANCELLED" | "CANCELED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
