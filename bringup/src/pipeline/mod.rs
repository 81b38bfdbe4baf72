//! Table-driven bring-up and teardown.
//!
//! ## Architecture
//!
//! ```text
//! StageTable → StageDescriptor (init, term?, label)
//!
//! - Sequencer: runs init front to back, unwinds the completed prefix on failure
//! - teardown::unwind: term for a prefix, last first
//! - teardown::full_shutdown: unwind everything, then the two halts
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use bringup::pipeline::{Sequencer, StageDescriptor, StageTable, teardown};
//!
//! let table = StageTable::builder()
//!     .stage(StageDescriptor::new("regs", "Register map failed", map_regs).with_term(unmap_regs))
//!     .stage(StageDescriptor::new("freq", "Populating max frequency failed", probe_freq))
//!     .build();
//!
//! let metrics = Sequencer::run(&table, &mut dev)?;
//! // ...
//! teardown::full_shutdown(&table, &mut dev);
//! ```

mod metrics;
mod sequencer;
mod stage;
mod table;
pub mod teardown;

#[cfg(test)]
pub(crate) mod testing;

pub use metrics::{PipelineMetrics, StageMetrics};
pub use sequencer::{Sequencer, StageFailure};
pub use stage::{InitFn, StageDescriptor, TermFn};
pub use table::{StageTable, StageTableBuilder};
pub use teardown::{DeviceHalt, full_shutdown, unwind};
