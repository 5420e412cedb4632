use ordering::OrderServiceError;
use thiserror::Error;

/// Errors raised while handling a payment event.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The message can never be processed. It is logged and acknowledged.
    #[error("Malformed payment event: {0}")]
    Malformed(String),

    /// Settling the order failed. The message is redelivered.
    #[error("Payment event processing failed: {0}")]
    Processing(#[from] OrderServiceError),

    #[error("Event source error: {0}")]
    Source(String),
}

impl ListenerError {
    /// Returns true if redelivering the message may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ListenerError::Processing(_) | ListenerError::Source(_))
    }
}

pub type Result<T> = std::result::Result<T, ListenerError>;
