//! The compensation stack.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{CompensationFailure, CompensationReport, Result, SagaError};
use crate::state::SagaState;

type Compensation = Box<dyn FnOnce() -> BoxFuture<'static, std::result::Result<(), String>> + Send>;

struct CompensationStep {
    name: String,
    action: Compensation,
}

/// One multi-step operation and the compensations for its completed steps.
///
/// Register a compensation right after each step succeeds, then call
/// [`complete`](Self::complete) when all steps succeeded or
/// [`compensate`](Self::compensate) when one failed. Either call ends the
/// saga; it cannot be reused.
pub struct SagaTransaction {
    id: Uuid,
    steps: Vec<CompensationStep>,
    state: SagaState,
}

impl Default for SagaTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl SagaTransaction {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            steps: Vec::new(),
            state: SagaState::Active,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Number of compensations waiting to run.
    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Pushes a compensation for a step that just succeeded.
    pub fn add_compensation<F, Fut, E>(&mut self, name: impl Into<String>, action: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        if !self.state.accepts_compensations() {
            return Err(SagaError::NotActive {
                saga_id: self.id,
                state: self.state,
            });
        }

        let name = name.into();
        debug!(saga_id = %self.id, step = %name, "Compensation registered");
        self.steps.push(CompensationStep {
            name,
            action: Box::new(move || {
                async move { action().await.map_err(|e| e.to_string()) }.boxed()
            }),
        });
        Ok(())
    }

    /// Marks every step as succeeded and drops the compensations.
    pub fn complete(&mut self) {
        if self.state.is_terminal() {
            warn!(saga_id = %self.id, state = %self.state, "Saga already finished");
            return;
        }
        self.steps.clear();
        self.state = SagaState::Completed;
        metrics::counter!("saga_completed_total").increment(1);
        info!(saga_id = %self.id, "Saga completed");
    }

    /// Runs the registered compensations, newest first.
    ///
    /// A failing or panicking compensation is recorded in the report and the
    /// unwind moves on to the next one. On a completed or already
    /// compensated saga this does nothing.
    pub async fn compensate(&mut self) -> CompensationReport {
        let mut report = CompensationReport::default();
        if self.state.is_terminal() {
            warn!(saga_id = %self.id, state = %self.state, "Compensate called on finished saga");
            return report;
        }

        self.state = SagaState::Compensating;
        let total = self.steps.len();
        info!(saga_id = %self.id, steps = total, "Starting compensation");
        let started = std::time::Instant::now();

        let mut position = 0;
        while let Some(step) = self.steps.pop() {
            position += 1;
            info!(saga_id = %self.id, step = %step.name, position, total, "Running compensation");

            let outcome = AssertUnwindSafe((step.action)()).catch_unwind().await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(reason)) => Some(reason),
                Err(_) => Some("compensation panicked".to_string()),
            };

            if let Some(reason) = failure {
                error!(
                    saga_id = %self.id,
                    step = %step.name,
                    reason = %reason,
                    manual_intervention = true,
                    "Compensation step failed"
                );
                metrics::counter!("saga_compensation_failures_total").increment(1);
                report.failures.push(CompensationFailure {
                    saga_id: self.id,
                    step: step.name.clone(),
                    reason,
                });
            }
            report.executed.push(step.name);
        }

        self.state = SagaState::Compensated;
        metrics::counter!("saga_compensations_total").increment(1);
        metrics::histogram!("saga_compensation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            saga_id = %self.id,
            steps = total,
            failed = report.failures.len(),
            "Compensation finished"
        );
        report
    }
}

impl Drop for SagaTransaction {
    fn drop(&mut self) {
        if !self.steps.is_empty() && self.state == SagaState::Active {
            warn!(
                saga_id = %self.id,
                pending = self.steps.len(),
                "Saga dropped without complete or compensate"
            );
        }
    }
}
