//! Saga support for multi-step operations that span services.
//!
//! A [`SagaTransaction`] records one compensation per completed step. If a
//! later step fails, [`SagaTransaction::compensate`] undoes the earlier
//! steps in reverse order. Compensations that fail are reported for manual
//! follow-up; they never stop the unwind.

pub mod error;
pub mod state;
pub mod transaction;

pub use error::{CompensationFailure, CompensationReport, Result, SagaError};
pub use state::SagaState;
pub use transaction::SagaTransaction;
