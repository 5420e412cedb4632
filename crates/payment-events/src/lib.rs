//! Asynchronous payment outcomes.
//!
//! The payment authority publishes one event per payment attempt. The
//! [`PaymentEventListener`] decodes each event and settles or fails the
//! order through the order engine. Delivery is at-least-once, so every
//! outcome must be safe to apply twice.

pub mod error;
pub mod event;
pub mod listener;
pub mod source;

pub use error::{ListenerError, Result};
pub use event::{PaymentEvent, PaymentSignal};
pub use listener::{Disposition, PaymentEventListener};
pub use source::{
    ChannelSource, Delivery, PaymentEventPublisher, PaymentEventSource, Position, RedeliveryDecision,
    RedeliveryLedger, channel,
};

#[cfg(feature = "kafka")]
pub use source::kafka::{KafkaSource, KafkaSourceConfig};
