//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Active ──┬──► Completed
///          └──► Compensating ──► Compensated
/// ```
///
/// Both `Completed` and `Compensated` are final: the saga is inert afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Steps are running and compensations may be added.
    #[default]
    Active,

    /// A step failed and compensations are being executed.
    Compensating,

    /// Every step succeeded (terminal state).
    Completed,

    /// The compensation stack was unwound (terminal state).
    Compensated,
}

impl SagaState {
    pub fn accepts_compensations(&self) -> bool {
        matches!(self, SagaState::Active)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Compensated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Active => "Active",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Compensated => "Compensated",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
