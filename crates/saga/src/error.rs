//! Saga error and report types.

use thiserror::Error;
use uuid::Uuid;

use crate::state::SagaState;

/// Errors that can occur during saga operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SagaError {
    /// The saga no longer accepts compensations.
    #[error("Saga {saga_id} is {state}; no more compensations can be added")]
    NotActive { saga_id: Uuid, state: SagaState },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

/// A compensation step that failed and needs manual follow-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    pub saga_id: Uuid,
    pub step: String,
    pub reason: String,
}

/// What happened during an unwind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Steps that ran, in the order they ran.
    pub executed: Vec<String>,
    /// Steps that failed. Each one is also in `executed`.
    pub failures: Vec<CompensationFailure>,
}

impl CompensationReport {
    /// True when every step that ran succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
