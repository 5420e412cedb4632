//! Where payment events come from.
//!
//! A source hands out [`Delivery`] values and is told afterwards whether each
//! one was handled (acknowledged) or must be delivered again.

#[cfg(feature = "kafka")]
pub mod kafka;

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::{ListenerError, PaymentEvent, Result};

/// Broker coordinates of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// One delivery of a raw payment event.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub payload: Vec<u8>,
    /// 1 on first delivery.
    pub attempt: u32,
    pub position: Option<Position>,
}

#[async_trait]
pub trait PaymentEventSource: Send {
    /// Waits for the next delivery. `None` once the source is exhausted.
    async fn recv(&mut self) -> Option<Result<Delivery>>;

    /// Marks the delivery as handled; it is not delivered again.
    async fn ack(&mut self, delivery: Delivery) -> Result<()>;

    /// Schedules the delivery to be received again.
    async fn redeliver(&mut self, delivery: Delivery) -> Result<()>;
}

/// What to do with a delivery that failed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeliveryDecision {
    /// Deliver it again; this will be attempt number `next_attempt`.
    Retry { next_attempt: u32 },
    /// Stop retrying and move past it.
    GiveUp { attempts: u32 },
}

/// Counts failed deliveries per broker position, for sources that redeliver
/// by rewinding rather than by holding the message themselves.
#[derive(Debug)]
pub struct RedeliveryLedger {
    max_attempts: u32,
    failures: HashMap<Position, u32>,
}

impl RedeliveryLedger {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            failures: HashMap::new(),
        }
    }

    /// Attempt number of the next delivery at `position`, 1 if it never
    /// failed.
    pub fn attempt(&self, position: &Position) -> u32 {
        self.failures.get(position).copied().unwrap_or(0) + 1
    }

    /// Records one more failure at `position`. Once `max_attempts` deliveries
    /// failed the position is forgotten and the caller must move past it.
    pub fn record_failure(&mut self, position: &Position) -> RedeliveryDecision {
        let failures = self.failures.entry(position.clone()).or_insert(0);
        *failures += 1;
        let attempts = *failures;
        if attempts >= self.max_attempts {
            self.failures.remove(position);
            RedeliveryDecision::GiveUp { attempts }
        } else {
            RedeliveryDecision::Retry {
                next_attempt: attempts + 1,
            }
        }
    }

    /// Forgets `position` after it was handled.
    pub fn settle(&mut self, position: &Position) {
        self.failures.remove(position);
    }

    pub fn pending(&self) -> usize {
        self.failures.len()
    }
}

/// Creates an in-process event channel.
pub fn channel(capacity: usize) -> (PaymentEventPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        PaymentEventPublisher { tx },
        ChannelSource {
            rx,
            retries: VecDeque::new(),
            max_attempts: 5,
            redelivery_delay: Duration::from_millis(100),
            dead_letters: Vec::new(),
        },
    )
}

/// Sending half of an in-process event channel.
#[derive(Clone)]
pub struct PaymentEventPublisher {
    tx: mpsc::Sender<Delivery>,
}

impl PaymentEventPublisher {
    pub async fn publish(&self, event: &PaymentEvent) -> Result<()> {
        let payload =
            serde_json::to_vec(event).map_err(|e| ListenerError::Source(e.to_string()))?;
        self.publish_raw(payload).await
    }

    /// Publishes an already encoded payload, valid or not.
    pub async fn publish_raw(&self, payload: Vec<u8>) -> Result<()> {
        self.tx
            .send(Delivery {
                payload,
                attempt: 1,
                position: None,
            })
            .await
            .map_err(|_| ListenerError::Source("payment event channel closed".to_string()))
    }
}

/// Receiving half of an in-process event channel.
///
/// Redelivered events are received again before new ones, after a delay. An
/// event that keeps failing is parked after `max_attempts` deliveries.
pub struct ChannelSource {
    rx: mpsc::Receiver<Delivery>,
    retries: VecDeque<Delivery>,
    max_attempts: u32,
    redelivery_delay: Duration,
    dead_letters: Vec<Delivery>,
}

impl ChannelSource {
    pub fn with_redelivery(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.redelivery_delay = delay;
        self
    }

    /// Events that exhausted their delivery attempts.
    pub fn dead_letters(&self) -> &[Delivery] {
        &self.dead_letters
    }
}

#[async_trait]
impl PaymentEventSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<Delivery>> {
        if let Some(delivery) = self.retries.pop_front() {
            return Some(Ok(delivery));
        }
        self.rx.recv().await.map(Ok)
    }

    async fn ack(&mut self, delivery: Delivery) -> Result<()> {
        debug!(attempt = delivery.attempt, "Payment event acknowledged");
        Ok(())
    }

    async fn redeliver(&mut self, mut delivery: Delivery) -> Result<()> {
        if delivery.attempt >= self.max_attempts {
            error!(
                attempts = delivery.attempt,
                manual_intervention = true,
                "Payment event exhausted its deliveries; parking it"
            );
            metrics::counter!("payment_events_dead_lettered_total").increment(1);
            self.dead_letters.push(delivery);
            return Ok(());
        }

        tokio::time::sleep(self.redelivery_delay).await;
        delivery.attempt += 1;
        self.retries.push_back(delivery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_until_parked() {
        let (publisher, source) = channel(4);
        let mut source = source.with_redelivery(2, Duration::from_millis(10));
        publisher.publish_raw(b"x".to_vec()).await.unwrap();

        let first = source.recv().await.unwrap().unwrap();
        assert_eq!(first.attempt, 1);
        source.redeliver(first).await.unwrap();

        let second = source.recv().await.unwrap().unwrap();
        assert_eq!(second.attempt, 2);
        source.redeliver(second).await.unwrap();

        assert_eq!(source.dead_letters().len(), 1);
        drop(publisher);
        assert!(source.recv().await.is_none());
    }

    fn position(offset: i64) -> Position {
        Position {
            topic: "payment.created".to_string(),
            partition: 0,
            offset,
        }
    }

    #[test]
    fn test_ledger_gives_up_after_max_attempts() {
        let mut ledger = RedeliveryLedger::new(3);
        let at = position(42);
        assert_eq!(ledger.attempt(&at), 1);

        assert_eq!(
            ledger.record_failure(&at),
            RedeliveryDecision::Retry { next_attempt: 2 }
        );
        assert_eq!(ledger.attempt(&at), 2);
        assert_eq!(
            ledger.record_failure(&at),
            RedeliveryDecision::Retry { next_attempt: 3 }
        );
        assert_eq!(
            ledger.record_failure(&at),
            RedeliveryDecision::GiveUp { attempts: 3 }
        );

        // Forgotten once given up
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.attempt(&at), 1);
    }

    #[test]
    fn test_ledger_tracks_positions_separately() {
        let mut ledger = RedeliveryLedger::new(2);
        ledger.record_failure(&position(1));
        assert_eq!(ledger.attempt(&position(2)), 1);

        ledger.settle(&position(1));
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.attempt(&position(1)), 1);
    }

    #[test]
    fn test_single_attempt_ledger_never_retries() {
        let mut ledger = RedeliveryLedger::new(0);
        assert_eq!(
            ledger.record_failure(&position(7)),
            RedeliveryDecision::GiveUp { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn test_closed_publisher() {
        let (publisher, source) = channel(1);
        drop(source);
        assert!(matches!(
            publisher.publish_raw(Vec::new()).await,
            Err(ListenerError::Source(_))
        ));
    }
}
