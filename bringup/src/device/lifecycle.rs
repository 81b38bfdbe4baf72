//! Public lifecycle entry points.
//!
//! `device_init` = stage table + worker bootstrap.
//! `device_term` = full shutdown (every stage, then the two halts).

use crate::options::{WorkerFailurePolicy, WorkerOptions};
use crate::pipeline::{DeviceHalt, PipelineMetrics, Sequencer, StageTable, teardown};
use crate::util::panic_message;
use crate::workers::{DeviceWorkers, WorkerSpawner, bootstrap_workers};
use bringup_shared::errors::{BringupError, BringupResult};
use std::panic::{self, AssertUnwindSafe};

/// Everything a successful bring-up hands back to the caller.
pub struct Bringup {
    pub workers: DeviceWorkers,
    pub metrics: PipelineMetrics,
}

/// Bring the device up and start its workers.
///
/// A stage failure has already unwound the completed prefix when this
/// returns. A worker failure unwinds the whole table only under
/// [`WorkerFailurePolicy::Unwind`]; under `Retain` every stage stays up and
/// the caller must still call [`device_term`]. A panicking spawner counts as
/// a worker failure.
pub fn device_init<Ctx>(
    table: &StageTable<Ctx>,
    ctx: &mut Ctx,
    spawner: &dyn WorkerSpawner,
    options: &WorkerOptions,
) -> BringupResult<Bringup> {
    let metrics = Sequencer::run(table, ctx)?;

    let workers = match guarded_bootstrap(spawner, options) {
        Ok(workers) => workers,
        Err(e) => {
            match options.on_failure {
                WorkerFailurePolicy::Unwind => {
                    tracing::warn!(stages = table.len(), "Worker bootstrap failed, unwinding all stages");
                    teardown::unwind(table, ctx, table.len());
                }
                WorkerFailurePolicy::Retain => {
                    tracing::warn!(stages = table.len(), "Worker bootstrap failed, stages left up");
                }
            }
            return Err(e);
        }
    };

    tracing::info!(
        stages = table.len(),
        duration_ms = metrics.total_duration_ms as u64,
        "Device initialized"
    );

    Ok(Bringup { workers, metrics })
}

/// Every stage is up at this point, so a panic must not escape before the
/// failure policy has been applied.
fn guarded_bootstrap(spawner: &dyn WorkerSpawner, options: &WorkerOptions) -> BringupResult<DeviceWorkers> {
    panic::catch_unwind(AssertUnwindSafe(|| bootstrap_workers(spawner, options))).unwrap_or_else(|payload| {
        let reason = panic_message(payload.as_ref());
        tracing::error!(panic = %reason, "Worker bootstrap panicked");
        Err(BringupError::WorkerSpawn {
            worker: "bootstrap".to_string(),
            reason,
        })
    })
}

/// Tear down every stage and halt scheduling data and memory.
pub fn device_term<Ctx: DeviceHalt>(table: &StageTable<Ctx>, ctx: &mut Ctx) {
    teardown::full_shutdown(table, ctx);
}
