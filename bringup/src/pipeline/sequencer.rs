//! Bring-up sequencer.
//!
//! Runs a [`StageTable`] front to back. The first failing stage stops the
//! sequence; every stage that completed before it is torn down in reverse
//! order before the failure is returned.

use super::metrics::{PipelineMetrics, StageMetrics};
use super::table::StageTable;
use super::teardown;
use bringup_shared::errors::BringupError;
use std::time::Instant;
use thiserror::Error;

/// A stage's `init` failed. The stages before it have been unwound.
#[derive(Error, Debug)]
#[error("{label} error = {error}")]
pub struct StageFailure {
    pub index: usize,
    pub name: &'static str,
    pub label: &'static str,
    #[source]
    pub error: BringupError,
}

impl From<StageFailure> for BringupError {
    fn from(failure: StageFailure) -> Self {
        BringupError::Stage {
            index: failure.index,
            name: failure.name,
            label: failure.label,
            source: Box::new(failure.error),
        }
    }
}

/// RAII guard over the completed prefix of a running table.
///
/// Unwinds the prefix if dropped while armed, which only happens when a
/// stage's `init` panics.
struct UnwindGuard<'a, Ctx> {
    table: &'a StageTable<Ctx>,
    ctx: &'a mut Ctx,
    completed: usize,
    armed: bool,
}

impl<'a, Ctx> UnwindGuard<'a, Ctx> {
    fn new(table: &'a StageTable<Ctx>, ctx: &'a mut Ctx) -> Self {
        Self {
            table,
            ctx,
            completed: 0,
            armed: true,
        }
    }

    fn ctx(&mut self) -> &mut Ctx {
        &mut *self.ctx
    }

    fn complete(&mut self) {
        self.completed += 1;
    }

    /// Tear down the completed prefix now.
    fn rollback(&mut self) {
        if self.armed {
            self.armed = false;
            teardown::unwind(self.table, self.ctx, self.completed);
        }
    }

    /// Disarm the guard (call on success).
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<Ctx> Drop for UnwindGuard<'_, Ctx> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(
            completed = self.completed,
            "Bring-up interrupted by a panicking stage, unwinding"
        );
        self.rollback();
    }
}

/// Table-driven bring-up executor.
pub struct Sequencer;

impl Sequencer {
    /// Bring up every stage of `table` in order.
    ///
    /// On success the context holds everything the table produces and no
    /// `term` has run. On failure at index `k`, `term` has run for the
    /// stages in `[0, k)` (those that have one), last first.
    pub fn run<Ctx>(table: &StageTable<Ctx>, ctx: &mut Ctx) -> Result<PipelineMetrics, StageFailure> {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(table.len());
        let mut guard = UnwindGuard::new(table, ctx);

        for (index, stage) in table.iter().enumerate() {
            let stage_start = Instant::now();
            tracing::trace!(stage = stage.name(), index, "Initializing stage");

            if let Err(error) = stage.init(guard.ctx()) {
                tracing::error!(
                    stage = stage.name(),
                    index,
                    code = error.code(),
                    "{} error = {}",
                    stage.label(),
                    error
                );
                guard.rollback();
                return Err(StageFailure {
                    index,
                    name: stage.name(),
                    label: stage.label(),
                    error,
                });
            }

            guard.complete();
            stage_metrics.push(StageMetrics {
                index,
                name: stage.name(),
                duration_ms: stage_start.elapsed().as_millis(),
            });
        }

        guard.disarm();

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}
