//! Fault-injecting worker spawner.
//!
//! Wraps another spawner and makes selected worker creations or priority
//! requests fail. Used by the simulator and by tests that pin down how
//! bootstrap reacts to each failure.

use super::{ThreadSpawner, WorkItem, WorkerHandle, WorkerKind, WorkerSpawner};
use bringup_shared::errors::{BringupError, BringupResult};
use parking_lot::Mutex;

/// How real-time priority requests are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFault {
    /// Forward to the wrapped worker.
    #[default]
    Passthrough,
    /// Always refuse, as an unprivileged process would.
    Deny,
    /// Always accept without touching the scheduler.
    Grant,
}

pub struct FaultySpawner<S = ThreadSpawner> {
    inner: S,
    fail: Option<WorkerKind>,
    priority: PriorityFault,
    spawned: Mutex<Vec<String>>,
}

impl Default for FaultySpawner {
    fn default() -> Self {
        Self::wrap(ThreadSpawner)
    }
}

impl<S: WorkerSpawner> FaultySpawner<S> {
    pub fn wrap(inner: S) -> Self {
        Self {
            inner,
            fail: None,
            priority: PriorityFault::default(),
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// Make creation of the `kind` worker fail.
    pub fn fail_spawn(mut self, kind: WorkerKind) -> Self {
        self.fail = Some(kind);
        self
    }

    pub fn priority(mut self, fault: PriorityFault) -> Self {
        self.priority = fault;
        self
    }

    /// Names of the workers created so far, in creation order.
    pub fn spawned(&self) -> Vec<String> {
        self.spawned.lock().clone()
    }
}

impl<S: WorkerSpawner> WorkerSpawner for FaultySpawner<S> {
    fn spawn(&self, kind: WorkerKind, name: &str) -> BringupResult<Box<dyn WorkerHandle>> {
        if self.fail == Some(kind) {
            return Err(BringupError::WorkerSpawn {
                worker: name.to_string(),
                reason: "injected spawn failure".to_string(),
            });
        }

        let handle = self.inner.spawn(kind, name)?;
        self.spawned.lock().push(name.to_string());

        match self.priority {
            PriorityFault::Passthrough => Ok(handle),
            fault => Ok(Box::new(PriorityOverride {
                inner: handle,
                deny: fault == PriorityFault::Deny,
            })),
        }
    }
}

struct PriorityOverride {
    inner: Box<dyn WorkerHandle>,
    deny: bool,
}

impl WorkerHandle for PriorityOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> WorkerKind {
        self.inner.kind()
    }

    fn queue(&self, item: WorkItem) -> BringupResult<()> {
        self.inner.queue(item)
    }

    fn set_realtime_priority(&self, priority: i32) -> BringupResult<()> {
        if self.deny {
            return Err(BringupError::Scheduling(format!(
                "SCHED_FIFO priority {} for {}: operation not permitted (injected)",
                priority,
                self.inner.name()
            )));
        }
        Ok(())
    }

    fn stop(&mut self) -> BringupResult<()> {
        self.inner.stop()
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}
