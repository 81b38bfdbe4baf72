//! Ordered stage tables.

use super::sequencer::Sequencer;
use super::stage::StageDescriptor;
use super::teardown;
use std::sync::Arc;

/// Fixed, ordered sequence of stages.
///
/// Order is dependency order: stage `i` may rely on everything stages
/// `0..i` attached to the context. A table is built once per
/// configuration and never mutated afterwards.
#[derive(Debug)]
pub struct StageTable<Ctx> {
    stages: Vec<StageDescriptor<Ctx>>,
}

impl<Ctx> StageTable<Ctx> {
    pub fn new(stages: Vec<StageDescriptor<Ctx>>) -> Self {
        Self { stages }
    }

    pub fn builder() -> StageTableBuilder<Ctx> {
        StageTableBuilder { stages: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StageDescriptor<Ctx>> {
        self.stages.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageDescriptor<Ctx>> {
        self.stages.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(StageDescriptor::name).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.name() == name)
    }
}

impl<Ctx: 'static> StageTable<Ctx> {
    /// Collapse this table into a single stage of an enclosing table.
    ///
    /// The group's `init` runs the nested table and unwinds it on its own
    /// when one of its stages fails, so the enclosing sequencer only sees a
    /// failed group with nothing left to undo. The group's `term` unwinds
    /// the whole nested table.
    pub fn into_group(self, name: &'static str, label: &'static str) -> StageDescriptor<Ctx> {
        let table = Arc::new(self);
        let nested = Arc::clone(&table);

        StageDescriptor::new(name, label, move |ctx: &mut Ctx| {
            Sequencer::run(&nested, ctx)
                .map(|_| ())
                .map_err(Into::into)
        })
        .with_term(move |ctx: &mut Ctx| teardown::unwind(&table, ctx, table.len()))
    }
}

/// Builds a [`StageTable`], with optional feature-gated membership.
pub struct StageTableBuilder<Ctx> {
    stages: Vec<StageDescriptor<Ctx>>,
}

impl<Ctx> StageTableBuilder<Ctx> {
    pub fn stage(mut self, stage: StageDescriptor<Ctx>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append `stage` only when `enabled` holds for this configuration.
    pub fn stage_if(self, enabled: bool, stage: StageDescriptor<Ctx>) -> Self {
        if enabled { self.stage(stage) } else { self }
    }

    pub fn build(self) -> StageTable<Ctx> {
        StageTable::new(self.stages)
    }
}
