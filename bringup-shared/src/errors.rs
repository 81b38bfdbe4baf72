//! Error types for device bring-up.

use thiserror::Error;

/// Result alias used across the bringup crates.
pub type BringupResult<T> = Result<T, BringupError>;

/// Errors surfaced by stages, the sequencer and worker bootstrap.
#[derive(Error, Debug)]
pub enum BringupError {
    /// A stage's `init` failed. The completed prefix has already been unwound.
    #[error("{label} error = {source}")]
    Stage {
        index: usize,
        name: &'static str,
        label: &'static str,
        #[source]
        source: Box<BringupError>,
    },

    /// A background worker could not be created.
    #[error("failed to create worker {worker}: {reason}")]
    WorkerSpawn { worker: String, reason: String },

    /// Scheduling policy or priority could not be applied.
    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Hardware or simulated hardware reported a failure.
    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BringupError {
    /// Negative errno-style code for diagnostics.
    ///
    /// Stage failures report the code of the underlying error.
    pub fn code(&self) -> i32 {
        match self {
            BringupError::Stage { source, .. } => source.code(),
            BringupError::WorkerSpawn { .. } => -libc::ENOMEM,
            BringupError::Scheduling(_) => -libc::EPERM,
            BringupError::OutOfMemory(_) => -libc::ENOMEM,
            BringupError::InvalidArgument(_) | BringupError::Config(_) => -libc::EINVAL,
            BringupError::Device(_) => -libc::EIO,
            BringupError::Unsupported(_) => -libc::ENODEV,
            BringupError::InvalidState(_) => -libc::EBUSY,
            BringupError::Io(e) => -e.raw_os_error().unwrap_or(libc::EIO),
            BringupError::Internal(_) => -libc::EFAULT,
        }
    }

    /// Index of the failing stage, if this error came from the stage table.
    pub fn failed_stage(&self) -> Option<usize> {
        match self {
            BringupError::Stage { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_worker_spawn(&self) -> bool {
        matches!(self, BringupError::WorkerSpawn { .. })
    }
}
