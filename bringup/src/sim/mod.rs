//! Simulated GPU device.
//!
//! A device context that stands in for real hardware: every stage of the
//! driver table attaches a named resource on `init` and detaches it on
//! `term`, and every step is journaled. Faults can be injected per stage so
//! that any failure path can be driven end to end.

mod stages;

pub use stages::{BACKEND_STAGES, backend_table, stage_table};

use crate::device::Device;
use crate::options::DeviceOptions;
use crate::pipeline::DeviceHalt;
use bringup_shared::errors::{BringupError, BringupResult};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Error class returned by an injected stage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Device,
    OutOfMemory,
    InvalidArgument,
}

/// Stage faults to inject into a [`SimDevice`].
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    failing: HashMap<String, FaultKind>,
    panicking_terms: HashSet<String>,
}

impl FaultPlan {
    /// Make `init` of `stage` fail with a device error.
    pub fn fail_stage(self, stage: &str) -> Self {
        self.fail_with(stage, FaultKind::Device)
    }

    pub fn fail_with(mut self, stage: &str, kind: FaultKind) -> Self {
        self.failing.insert(stage.to_string(), kind);
        self
    }

    /// Make `term` of `stage` panic.
    pub fn panic_on_term(mut self, stage: &str) -> Self {
        self.panicking_terms.insert(stage.to_string());
        self
    }

    fn error_for(&self, stage: &str) -> Option<BringupError> {
        let kind = self.failing.get(stage)?;
        let msg = format!("injected fault in {}", stage);
        Some(match kind {
            FaultKind::Device => BringupError::Device(msg),
            FaultKind::OutOfMemory => BringupError::OutOfMemory(msg),
            FaultKind::InvalidArgument => BringupError::InvalidArgument(msg),
        })
    }
}

/// One journaled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "name", rename_all = "snake_case")]
pub enum SimEvent {
    Init(&'static str),
    Fault(&'static str),
    Term(&'static str),
    Halt(&'static str),
    /// A resource was attached twice without being detached.
    DoubleAcquire(&'static str),
    /// A resource was detached that was not attached.
    DoubleRelease(&'static str),
}

/// Simulated device context.
#[derive(Debug, Default)]
pub struct SimDevice {
    faults: FaultPlan,
    resources: BTreeSet<&'static str>,
    journal: Vec<SimEvent>,
    /// IRQ lines found by `assign_irqs` (job, mmu, gpu).
    pub irqs: Option<[u32; 3]>,
    /// Set by `populate_max_freq`.
    pub max_freq_khz: Option<u64>,
    /// Set by `coherency`.
    pub coherency_mode: Option<&'static str>,
    /// Set by `update_l2_features`.
    pub l2_slices: Option<u32>,
    pub scheduling_halted: bool,
    pub memory_halted: bool,
}

impl SimDevice {
    pub fn new(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Default::default()
        }
    }

    pub fn journal(&self) -> &[SimEvent] {
        &self.journal
    }

    /// Resources currently attached, sorted by name.
    pub fn resources(&self) -> Vec<&'static str> {
        self.resources.iter().copied().collect()
    }

    pub fn holds(&self, resource: &str) -> bool {
        self.resources.contains(resource)
    }

    /// No resources attached and no double acquire/release recorded.
    pub fn is_clean(&self) -> bool {
        self.resources.is_empty()
            && !self
                .journal
                .iter()
                .any(|e| matches!(e, SimEvent::DoubleAcquire(_) | SimEvent::DoubleRelease(_)))
    }

    /// Number of `term` calls journaled for `stage`.
    pub fn term_count(&self, stage: &str) -> usize {
        self.journal
            .iter()
            .filter(|e| matches!(e, SimEvent::Term(name) if *name == stage))
            .count()
    }

    /// Entry check of every stage `init`: applies injected faults.
    fn enter(&mut self, stage: &'static str) -> BringupResult<()> {
        if let Some(err) = self.faults.error_for(stage) {
            self.journal.push(SimEvent::Fault(stage));
            return Err(err);
        }
        self.journal.push(SimEvent::Init(stage));
        Ok(())
    }

    fn acquire(&mut self, resource: &'static str) {
        if !self.resources.insert(resource) {
            tracing::error!(resource, "Resource attached twice");
            self.journal.push(SimEvent::DoubleAcquire(resource));
        }
    }

    fn release(&mut self, stage: &'static str, resource: &'static str) {
        if self.faults.panicking_terms.contains(stage) {
            panic!("injected teardown panic in {}", stage);
        }
        if !self.resources.remove(resource) {
            tracing::error!(resource, "Resource released but not attached");
            self.journal.push(SimEvent::DoubleRelease(resource));
        }
        self.journal.push(SimEvent::Term(stage));
    }
}

impl DeviceHalt for SimDevice {
    fn halt_scheduling_data(&mut self) {
        self.scheduling_halted = true;
        self.journal.push(SimEvent::Halt("scheduling_data"));
    }

    fn halt_memory(&mut self) {
        self.memory_halted = true;
        self.journal.push(SimEvent::Halt("memory"));
    }
}

/// Build a simulated device with the stage table selected by `options`.
pub fn build_device(options: &DeviceOptions, faults: FaultPlan) -> BringupResult<Device<SimDevice>> {
    Device::new(stage_table(&options.features), SimDevice::new(faults), options)
}
