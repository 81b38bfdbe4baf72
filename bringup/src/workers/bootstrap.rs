//! Worker bootstrap.
//!
//! Runs once the whole stage table is up:
//! 1. Create the completion worker (failure is fatal)
//! 2. Raise its priority to SCHED_FIFO (failure is a warning)
//! 3. Create the event worker (failure is fatal)
//!
//! Rolling back the stage table on failure is the caller's decision, see
//! [`WorkerFailurePolicy`](crate::options::WorkerFailurePolicy).

use super::{WorkItem, WorkerHandle, WorkerKind, WorkerSpawner};
use crate::options::WorkerOptions;
use bringup_shared::errors::{BringupError, BringupResult};

/// The two background workers of a brought-up device.
pub struct DeviceWorkers {
    completion: Box<dyn WorkerHandle>,
    event: Box<dyn WorkerHandle>,
    realtime_priority: Option<i32>,
}

impl DeviceWorkers {
    pub fn completion(&self) -> &dyn WorkerHandle {
        self.completion.as_ref()
    }

    pub fn event(&self) -> &dyn WorkerHandle {
        self.event.as_ref()
    }

    /// Priority the completion worker runs at, or `None` if it stayed at
    /// normal priority.
    pub fn realtime_priority(&self) -> Option<i32> {
        self.realtime_priority
    }

    pub fn queue_completion(&self, item: WorkItem) -> BringupResult<()> {
        self.completion.queue(item)
    }

    pub fn queue_event(&self, item: WorkItem) -> BringupResult<()> {
        self.event.queue(item)
    }

    /// Stop both workers, event worker first.
    ///
    /// Both stops are attempted; the first error is returned.
    pub fn stop(mut self) -> BringupResult<()> {
        let event = self.event.stop();
        let completion = self.completion.stop();
        event.and(completion)
    }
}

/// Create the completion and event workers.
pub fn bootstrap_workers(
    spawner: &dyn WorkerSpawner,
    options: &WorkerOptions,
) -> BringupResult<DeviceWorkers> {
    let completion = spawn(spawner, WorkerKind::Completion, &options.completion_name)?;

    let realtime_priority = if options.elevate_priority {
        elevate(completion.as_ref(), options.completion_priority)
    } else {
        tracing::debug!(worker = completion.name(), "Real-time priority disabled by options");
        None
    };

    // On failure `completion` is dropped here, which stops its thread.
    let event = spawn(spawner, WorkerKind::Event, &options.event_name)?;

    tracing::debug!(
        completion = completion.name(),
        event = event.name(),
        realtime_priority = ?realtime_priority,
        "Workers started"
    );

    Ok(DeviceWorkers {
        completion,
        event,
        realtime_priority,
    })
}

fn spawn(
    spawner: &dyn WorkerSpawner,
    kind: WorkerKind,
    name: &str,
) -> BringupResult<Box<dyn WorkerHandle>> {
    spawner.spawn(kind, name).map_err(|e| {
        tracing::error!(worker = %name, %kind, code = e.code(), "Failed to create worker: {}", e);
        match e {
            BringupError::WorkerSpawn { .. } => e,
            other => BringupError::WorkerSpawn {
                worker: name.to_string(),
                reason: other.to_string(),
            },
        }
    })
}

/// Best-effort priority raise. Never fails.
fn elevate(worker: &dyn WorkerHandle, priority: i32) -> Option<i32> {
    match worker.set_realtime_priority(priority) {
        Ok(()) => {
            tracing::info!(worker = worker.name(), priority, "Worker set to real-time priority");
            Some(priority)
        }
        Err(e) => {
            tracing::warn!(worker = worker.name(), error = %e, "Worker not set to real-time priority");
            None
        }
    }
}
