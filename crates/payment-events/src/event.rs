//! Wire format of payment events.

use common::{CustomerId, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::{ListenerError, Result};

/// A payment event as published by the payment authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    #[serde(alias = "paymentStatus")]
    pub status: String,
    #[serde(default)]
    pub amount: i64,
}

/// What a payment event asks the order engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentSignal {
    Completed {
        order_id: OrderId,
        payment_id: PaymentId,
    },
    /// Any terminal status other than completed.
    Failed { order_id: OrderId, status: String },
    /// The payment is still in flight; nothing to do yet.
    InProgress { order_id: OrderId, status: String },
}

impl PaymentEvent {
    /// Decodes a JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| ListenerError::Malformed(e.to_string()))
    }

    /// Classifies the event by its status code.
    pub fn signal(&self) -> Result<PaymentSignal> {
        let status = self.status.trim().to_ascii_uppercase();
        let order_id = self.order_id;
        match status.as_str() {
            "COMPLETED" => Ok(PaymentSignal::Completed {
                order_id,
                payment_id: self.payment_id,
            }),
            "FAILED" | "CANCELLED" | "CANCELED" | "TIMEOUT" => {
                Ok(PaymentSignal::Failed { order_id, status })
            }
            "PENDING" | "PROCESSING" => Ok(PaymentSignal::InProgress { order_id, status }),
            _ => Err(ListenerError::Malformed(format!(
                "unknown payment status {:?}",
                self.status
            ))),
        }
    }
}
