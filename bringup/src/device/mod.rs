//! Device - owner of one stage table, its context and its workers.
//!
//! ## Architecture
//!
//! - `lifecycle`: stateless `device_init` / `device_term` entry points
//! - [`Device`]: tracks how many stages are live so teardown never
//!   touches a stage twice, whatever path bring-up took
//!
//! ```text
//! Created ──init ok──→ Running ──term──→ Terminated
//!    │                                       ↑
//!    └──init err──→ Failed ──────term────────┘
//! ```

mod lifecycle;

pub use lifecycle::{Bringup, device_init, device_term};

use crate::options::{DeviceOptions, WorkerFailurePolicy, WorkerOptions};
use crate::pipeline::{DeviceHalt, PipelineMetrics, StageTable, teardown};
use crate::workers::{DeviceWorkers, ThreadSpawner, WorkerSpawner};
use bringup_shared::errors::{BringupError, BringupResult};
use std::sync::atomic::{AtomicU32, Ordering};

/// Process-wide device counter.
static NEXT_DEVICE_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Created,
    Running,
    Failed,
    Terminated,
}

/// A device under bring-up management.
///
/// Dropping a device that was brought up (even partly) without calling
/// [`Device::term`] tears it down with a warning.
pub struct Device<Ctx: DeviceHalt> {
    id: u32,
    table: StageTable<Ctx>,
    ctx: Ctx,
    options: WorkerOptions,
    spawner: Box<dyn WorkerSpawner>,
    /// Length of the stage prefix currently brought up.
    live: usize,
    workers: Option<DeviceWorkers>,
    metrics: Option<PipelineMetrics>,
    state: DeviceState,
}

impl<Ctx: DeviceHalt> Device<Ctx> {
    pub fn new(table: StageTable<Ctx>, ctx: Ctx, options: &DeviceOptions) -> BringupResult<Self> {
        options.sanitize()?;

        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(device = id, stages = table.len(), "Device created");

        Ok(Self {
            id,
            table,
            ctx,
            options: options.workers.clone(),
            spawner: Box::new(ThreadSpawner),
            live: 0,
            workers: None,
            metrics: None,
            state: DeviceState::Created,
        })
    }

    /// Replace the worker spawner.
    pub fn with_spawner(mut self, spawner: impl WorkerSpawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn ctx(&self) -> &Ctx {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut Ctx {
        &mut self.ctx
    }

    pub fn table(&self) -> &StageTable<Ctx> {
        &self.table
    }

    pub fn workers(&self) -> Option<&DeviceWorkers> {
        self.workers.as_ref()
    }

    pub fn metrics(&self) -> Option<&PipelineMetrics> {
        self.metrics.as_ref()
    }

    /// Number of stages currently brought up.
    pub fn live_stages(&self) -> usize {
        self.live
    }

    /// Bring the device up. Only valid once, from `Created`.
    pub fn init(&mut self) -> BringupResult<()> {
        if self.state != DeviceState::Created {
            return Err(BringupError::InvalidState(format!(
                "device {} cannot be initialized from {:?}",
                self.id, self.state
            )));
        }

        tracing::info!(
            device = self.id,
            version = env!("CARGO_PKG_VERSION"),
            stages = self.table.len(),
            "Starting device bring-up"
        );

        match device_init(&self.table, &mut self.ctx, self.spawner.as_ref(), &self.options) {
            Ok(Bringup { workers, metrics }) => {
                self.live = self.table.len();
                self.workers = Some(workers);
                self.metrics = Some(metrics);
                self.state = DeviceState::Running;
                Ok(())
            }
            Err(e) => {
                self.live = if e.is_worker_spawn() && self.options.on_failure == WorkerFailurePolicy::Retain {
                    self.table.len()
                } else {
                    0
                };
                self.state = DeviceState::Failed;
                tracing::error!(device = self.id, code = e.code(), live = self.live, "Device bring-up failed: {}", e);
                Err(e)
            }
        }
    }

    /// Stop the workers, tear down the live stages and halt.
    ///
    /// Safe to call from any state; a second call does nothing.
    pub fn term(&mut self) {
        if self.state == DeviceState::Terminated {
            tracing::debug!(device = self.id, "Device already terminated");
            return;
        }

        if let Some(workers) = self.workers.take()
            && let Err(e) = workers.stop()
        {
            tracing::warn!(device = self.id, error = %e, "Failed to stop workers cleanly");
        }

        teardown::unwind(&self.table, &mut self.ctx, self.live);
        self.live = 0;
        teardown::halt_all(&mut self.ctx);

        self.state = DeviceState::Terminated;
        tracing::info!(device = self.id, "Device terminated");
    }
}

impl<Ctx: DeviceHalt> Drop for Device<Ctx> {
    fn drop(&mut self) {
        match self.state {
            DeviceState::Running | DeviceState::Failed => {
                tracing::warn!(device = self.id, "Device dropped without term(), tearing down");
                self.term();
            }
            DeviceState::Created | DeviceState::Terminated => {}
        }
    }
}
