//! Kafka-backed payment event source.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{error, info, warn};

use super::{Delivery, PaymentEventSource, Position, RedeliveryDecision, RedeliveryLedger};
use crate::{ListenerError, Result};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the payment topic consumer.
#[derive(Clone, Debug)]
pub struct KafkaSourceConfig {
    /// Comma-separated bootstrap servers.
    pub bootstrap_servers: String,
    pub group_id: String,
    pub topic: String,
    /// Pause before a failed message is read again.
    pub redelivery_delay: Duration,
    /// Deliveries of one message before it is committed past and left for
    /// manual follow-up.
    pub max_attempts: u32,
}

impl KafkaSourceConfig {
    pub fn new(bootstrap_servers: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_id: "order-service".to_string(),
            topic: topic.into(),
            redelivery_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    fn build_consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        config
    }
}

/// Reads payment events from a Kafka topic, committing offsets only for
/// acknowledged messages.
pub struct KafkaSource {
    consumer: StreamConsumer,
    config: KafkaSourceConfig,
    ledger: RedeliveryLedger,
}

impl KafkaSource {
    pub fn connect(config: KafkaSourceConfig) -> Result<Self> {
        let consumer: StreamConsumer = config.build_consumer_config().create().map_err(|e| {
            ListenerError::Source(format!("Failed to create Kafka consumer: {e}"))
        })?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| ListenerError::Source(format!("Failed to subscribe: {e}")))?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to payment events"
        );
        let ledger = RedeliveryLedger::new(config.max_attempts);
        Ok(Self {
            consumer,
            config,
            ledger,
        })
    }

    fn commit_past(&self, position: &Position) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset + 1),
            )
            .map_err(|e| ListenerError::Source(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| ListenerError::Source(format!("Failed to commit offset: {e}")))
    }
}

#[async_trait]
impl PaymentEventSource for KafkaSource {
    async fn recv(&mut self) -> Option<Result<Delivery>> {
        let delivery = match self.consumer.recv().await {
            Ok(message) => {
                let position = Position {
                    topic: message.topic().to_string(),
                    partition: message.partition(),
                    offset: message.offset(),
                };
                Ok(Delivery {
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    attempt: self.ledger.attempt(&position),
                    position: Some(position),
                })
            }
            Err(e) => Err(ListenerError::Source(e.to_string())),
        };
        Some(delivery)
    }

    async fn ack(&mut self, delivery: Delivery) -> Result<()> {
        let Some(position) = delivery.position else {
            return Ok(());
        };
        self.ledger.settle(&position);
        self.commit_past(&position)
    }

    async fn redeliver(&mut self, delivery: Delivery) -> Result<()> {
        let Some(position) = delivery.position else {
            return Ok(());
        };
        if let RedeliveryDecision::GiveUp { attempts } = self.ledger.record_failure(&position) {
            error!(
                topic = %position.topic,
                partition = position.partition,
                offset = position.offset,
                attempts,
                manual_intervention = true,
                "Payment event exhausted its deliveries; skipping it"
            );
            metrics::counter!("payment_events_dead_lettered_total").increment(1);
            return self.commit_past(&position);
        }
        warn!(
            topic = %position.topic,
            partition = position.partition,
            offset = position.offset,
            attempt = delivery.attempt,
            "Rewinding partition for redelivery"
        );
        tokio::time::sleep(self.config.redelivery_delay).await;
        self.consumer
            .seek(
                &position.topic,
                position.partition,
                Offset::Offset(position.offset),
                SEEK_TIMEOUT,
            )
            .map_err(|e| ListenerError::Source(format!("Failed to seek: {e}")))
    }
}
