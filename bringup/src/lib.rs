//! Staged device bring-up.
//!
//! A device is brought online by running an ordered [`StageTable`] of
//! init/term pairs against a caller-owned context. A failing stage unwinds
//! exactly the stages that completed before it, in reverse order. Once the
//! whole table is up, two background workers are started.
//!
//! ## Modules
//!
//! - `pipeline`: stage descriptors, tables, sequencer and teardown driver
//! - `workers`: worker creation, priority and bootstrap
//! - `device`: lifecycle entry points and the [`Device`] owner
//! - `sim`: a simulated GPU device exercising a full driver stage table

pub mod constants;
pub mod device;
mod logging;
pub mod options;
pub mod pipeline;
pub mod sim;
mod util;
pub mod workers;

pub use bringup_shared::{BringupError, BringupResult};
pub use device::{Bringup, Device, DeviceState, device_init, device_term};
pub use logging::init_logging;
pub use options::{DeviceOptions, FeatureSet, WorkerFailurePolicy, WorkerOptions};
pub use pipeline::{DeviceHalt, Sequencer, StageDescriptor, StageFailure, StageTable};
pub use workers::{DeviceWorkers, ThreadSpawner, WorkerHandle, WorkerKind, WorkerSpawner};
