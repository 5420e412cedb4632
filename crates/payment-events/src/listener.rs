use domain::{OrderStatus, PaymentOutcome, Transition};
use ordering::{OrderService, OrderServiceError};
use tracing::{debug, error, info, warn};

use crate::source::PaymentEventSource;
use crate::{ListenerError, PaymentEvent, PaymentSignal, Result};

/// What handling an event did to its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The order moved to `Paid`.
    Settled,
    /// The order was already paid; nothing changed.
    AlreadyPaid,
    /// The order moved to `PaymentFailed`.
    PaymentFailed,
    /// A failure arrived for an order that was already resolved.
    AlreadyResolved(OrderStatus),
    /// The payment has not reached a terminal status yet.
    InProgress,
    /// The status machine refused the event, e.g. a completion for a failed
    /// order. Redelivery cannot change that.
    Rejected,
}

/// Applies payment events to orders.
#[derive(Clone)]
pub struct PaymentEventListener {
    orders: OrderService,
}

impl PaymentEventListener {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }

    /// Decodes and applies one raw event.
    pub async fn handle(&self, payload: &[u8]) -> Result<Disposition> {
        let event = PaymentEvent::decode(payload)?;
        self.apply(&event).await
    }

    #[tracing::instrument(
        skip(self, event),
        fields(order_id = %event.order_id, payment_id = %event.payment_id, status = %event.status)
    )]
    pub async fn apply(&self, event: &PaymentEvent) -> Result<Disposition> {
        let disposition = match event.signal()? {
            PaymentSignal::Completed {
                order_id,
                payment_id,
            } => match self.orders.complete_payment(order_id, payment_id).await {
                Ok(PaymentOutcome::Settled) => Disposition::Settled,
                Ok(PaymentOutcome::AlreadyPaid) => Disposition::AlreadyPaid,
                Err(e) => return rejected_or_raise(e),
            },
            PaymentSignal::Failed { order_id, status } => {
                match self.orders.fail_payment(order_id, Some(&status)).await {
                    Ok(Transition::Applied) => Disposition::PaymentFailed,
                    Ok(Transition::Rejected { from, .. }) => Disposition::AlreadyResolved(from),
                    Ok(Transition::Unchanged) => {
                        Disposition::AlreadyResolved(OrderStatus::PaymentFailed)
                    }
                    Err(e) => return rejected_or_raise(e),
                }
            }
            PaymentSignal::InProgress { .. } => {
                debug!("Payment still in progress");
                Disposition::InProgress
            }
        };

        metrics::counter!("payment_events_processed_total").increment(1);
        Ok(disposition)
    }

    /// Consumes the source until it is exhausted.
    ///
    /// Malformed events are logged and acknowledged. Processing failures are
    /// handed back to the source for redelivery.
    pub async fn run<S>(&self, source: &mut S)
    where
        S: PaymentEventSource + ?Sized,
    {
        info!("Payment event listener started");
        while let Some(next) = source.recv().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "Failed to receive payment event");
                    continue;
                }
            };

            let settled = match self.handle(&delivery.payload).await {
                Ok(disposition) => {
                    debug!(?disposition, attempt = delivery.attempt, "Payment event handled");
                    source.ack(delivery).await
                }
                Err(ListenerError::Malformed(reason)) => {
                    metrics::counter!("payment_events_malformed_total").increment(1);
                    warn!(
                        %reason,
                        position = ?delivery.position,
                        "Dropping malformed payment event"
                    );
                    source.ack(delivery).await
                }
                Err(e) => {
                    metrics::counter!("payment_events_redelivered_total").increment(1);
                    warn!(
                        error = %e,
                        attempt = delivery.attempt,
                        "Payment event failed; requesting redelivery"
                    );
                    source.redeliver(delivery).await
                }
            };
            if let Err(e) = settled {
                error!(error = %e, "Failed to settle payment event with its source");
            }
        }
        info!("Payment event source closed; listener stopped");
    }
}

fn rejected_or_raise(error: OrderServiceError) -> Result<Disposition> {
    match error {
        OrderServiceError::Order(e) => {
            warn!(error = %e, "Payment event rejected by the order status machine");
            Ok(Disposition::Rejected)
        }
        other => Err(ListenerError::Processing(other)),
    }
}
