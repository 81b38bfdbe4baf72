//! Background workers created after a successful bring-up.
//!
//! ## Architecture
//!
//! - **WorkerSpawner**: creation of a worker execution context
//! - **WorkerHandle**: operations on a running worker (queue, priority, stop)
//!
//! Two workers exist per device: the completion-notification worker, which
//! asks for real-time priority, and the event worker. See
//! [`bootstrap_workers`].
//!
//! Workers are bound to their device context through
//! [`Device`](crate::Device): it stores the [`DeviceWorkers`] next to the
//! context it owns, and stops them before any stage of that context is torn
//! down. Work items reach device state only through what the caller moves
//! into them, so bootstrap itself never touches the context.

mod bootstrap;
mod fault;
mod thread;

pub use bootstrap::{DeviceWorkers, bootstrap_workers};
pub use fault::{FaultySpawner, PriorityFault};
pub use thread::{ThreadSpawner, ThreadWorker};

use bringup_shared::errors::BringupResult;
use std::fmt;

/// Unit of work consumed by a worker.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Role of a background worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    /// Signals job completion; runs at elevated priority when allowed.
    Completion,
    /// Delivers device events.
    Event,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Completion => f.write_str("completion"),
            WorkerKind::Event => f.write_str("event"),
        }
    }
}

/// Trait for creating workers.
pub trait WorkerSpawner: Send + Sync {
    /// Create and start a worker running its work-item loop.
    fn spawn(&self, kind: WorkerKind, name: &str) -> BringupResult<Box<dyn WorkerHandle>>;
}

/// Trait for operations on a running worker.
pub trait WorkerHandle: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> WorkerKind;

    /// Hand a work item to the worker.
    fn queue(&self, item: WorkItem) -> BringupResult<()>;

    /// Switch the worker to SCHED_FIFO at `priority`.
    fn set_realtime_priority(&self, priority: i32) -> BringupResult<()>;

    /// Stop accepting work, drain queued items and wait for the worker to exit.
    fn stop(&mut self) -> BringupResult<()>;

    fn is_running(&self) -> bool;
}
