//! Stage descriptor for table-driven bring-up.

use bringup_shared::errors::BringupResult;
use std::fmt;

/// Fallible bring-up operation of a stage.
pub type InitFn<Ctx> = Box<dyn Fn(&mut Ctx) -> BringupResult<()> + Send + Sync>;

/// Infallible teardown operation of a stage.
pub type TermFn<Ctx> = Box<dyn Fn(&mut Ctx) + Send + Sync>;

/// One bring-up/teardown unit.
///
/// A descriptor is immutable once built. `term` is only ever invoked after
/// `init` returned `Ok`, and at most once per successful `init`.
pub struct StageDescriptor<Ctx> {
    name: &'static str,
    label: &'static str,
    init: InitFn<Ctx>,
    term: Option<TermFn<Ctx>>,
}

impl<Ctx> StageDescriptor<Ctx> {
    /// Create a stage with no teardown.
    ///
    /// * `name` - short identifier used in logs, metrics and fault plans
    /// * `label` - diagnostic reported when `init` fails
    pub fn new<I>(name: &'static str, label: &'static str, init: I) -> Self
    where
        I: Fn(&mut Ctx) -> BringupResult<()> + Send + Sync + 'static,
    {
        Self {
            name,
            label,
            init: Box::new(init),
            term: None,
        }
    }

    /// Attach a teardown operation.
    pub fn with_term<T>(mut self, term: T) -> Self
    where
        T: Fn(&mut Ctx) + Send + Sync + 'static,
    {
        self.term = Some(Box::new(term));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn has_term(&self) -> bool {
        self.term.is_some()
    }

    pub(crate) fn init(&self, ctx: &mut Ctx) -> BringupResult<()> {
        (self.init)(ctx)
    }

    /// Returns false when there is nothing to undo.
    pub(crate) fn term(&self, ctx: &mut Ctx) -> bool {
        match &self.term {
            Some(term) => {
                term(ctx);
                true
            }
            None => false,
        }
    }
}

impl<Ctx> fmt::Debug for StageDescriptor<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("has_term", &self.has_term())
            .finish()
    }
}
