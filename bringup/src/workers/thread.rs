//! OS-thread workers.
//!
//! Each worker is a dedicated, named thread blocking on an unbounded queue.
//! A dedicated thread is what makes the real-time priority request
//! meaningful: the policy applies to exactly this worker.

use super::{WorkItem, WorkerHandle, WorkerKind, WorkerSpawner};
use crate::util::panic_message;
use bringup_shared::errors::{BringupError, BringupResult};
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Spawns [`ThreadWorker`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, kind: WorkerKind, name: &str) -> BringupResult<Box<dyn WorkerHandle>> {
        Ok(Box::new(ThreadWorker::spawn(kind, name)?))
    }
}

/// Handle to a worker thread. Stops the worker on drop.
pub struct ThreadWorker {
    name: String,
    kind: WorkerKind,
    tx: Option<UnboundedSender<WorkItem>>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadWorker {
    pub fn spawn(kind: WorkerKind, name: &str) -> BringupResult<Self> {
        // std panics on such names instead of returning an error.
        if name.contains('\0') {
            return Err(BringupError::WorkerSpawn {
                worker: name.escape_default().to_string(),
                reason: "thread name contains a NUL byte".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel::<WorkItem>();
        let loop_name = name.to_string();

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(&loop_name, rx))
            .map_err(|e| {
                tracing::error!(worker = %name, error = %e, "Failed to spawn worker thread");
                BringupError::WorkerSpawn {
                    worker: name.to_string(),
                    reason: e.to_string(),
                }
            })?;

        tracing::debug!(worker = %name, %kind, "Worker thread started");

        Ok(Self {
            name: name.to_string(),
            kind,
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    fn stop_inner(&mut self) -> BringupResult<()> {
        // Closing the sender ends the loop once queued items are drained.
        self.tx.take();

        if let Some(thread) = self.thread.take() {
            thread.join().map_err(|payload| {
                BringupError::Internal(format!(
                    "worker {} panicked: {}",
                    self.name,
                    panic_message(payload.as_ref())
                ))
            })?;
            tracing::debug!(worker = %self.name, "Worker thread stopped");
        }
        Ok(())
    }
}

impl WorkerHandle for ThreadWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> WorkerKind {
        self.kind
    }

    fn queue(&self, item: WorkItem) -> BringupResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BringupError::InvalidState(format!("worker {} is stopped", self.name)))?;
        tx.send(item)
            .map_err(|_| BringupError::InvalidState(format!("worker {} has exited", self.name)))
    }

    #[cfg(target_os = "linux")]
    fn set_realtime_priority(&self, priority: i32) -> BringupResult<()> {
        use std::os::unix::thread::JoinHandleExt;

        let thread = self
            .thread
            .as_ref()
            .ok_or_else(|| BringupError::InvalidState(format!("worker {} is stopped", self.name)))?;

        let param = libc::sched_param {
            sched_priority: priority,
        };
        // SAFETY: the pthread handle stays valid until the JoinHandle is joined,
        // which requires &mut self.
        let rc = unsafe { libc::pthread_setschedparam(thread.as_pthread_t(), libc::SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(BringupError::Scheduling(format!(
                "SCHED_FIFO priority {} for {}: {}",
                priority,
                self.name,
                std::io::Error::from_raw_os_error(rc)
            )));
        }
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn set_realtime_priority(&self, _priority: i32) -> BringupResult<()> {
        Err(BringupError::Unsupported(
            "real-time worker priority is only supported on Linux".to_string(),
        ))
    }

    fn stop(&mut self) -> BringupResult<()> {
        self.stop_inner()
    }

    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        if let Err(e) = self.stop_inner() {
            tracing::warn!(worker = %self.name, error = %e, "Failed to stop worker on drop");
        }
    }
}

/// Work-item loop. Runs until every sender is gone.
fn run_worker(name: &str, mut rx: UnboundedReceiver<WorkItem>) {
    while let Some(item) = rx.blocking_recv() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(item)) {
            tracing::error!(
                worker = %name,
                panic = %panic_message(payload.as_ref()),
                "Work item panicked"
            );
        }
    }
    tracing::trace!(worker = %name, "Worker queue closed");
}
