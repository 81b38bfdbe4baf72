//! Teardown driver.
//!
//! Two entry points:
//! - [`unwind`]: reverse-order teardown of a completed prefix
//! - [`full_shutdown`]: unwind of the whole table followed by the two halts
//!   whose lifecycle is not tied to any single stage
//!
//! Neither can fail. A `term` that panics is a defect of that stage; it is
//! logged and the unwind carries on with the remaining stages.

use super::table::StageTable;
use crate::util::panic_message;
use std::panic::{self, AssertUnwindSafe};

/// Halt operations performed on every full shutdown, after all stage
/// teardowns, regardless of how many stages were brought up.
pub trait DeviceHalt {
    /// Stop the job scheduling data from accepting or retaining work.
    fn halt_scheduling_data(&mut self);

    /// Quiesce the memory subsystem.
    fn halt_memory(&mut self);
}

/// Invoke `term` for every stage in `[0, upto_exclusive)`, last first.
///
/// Stages without a `term` are skipped.
pub fn unwind<Ctx>(table: &StageTable<Ctx>, ctx: &mut Ctx, upto_exclusive: usize) {
    let upto = if upto_exclusive > table.len() {
        tracing::warn!(
            requested = upto_exclusive,
            stages = table.len(),
            "Unwind bound exceeds table length, clamping"
        );
        table.len()
    } else {
        upto_exclusive
    };

    for (index, stage) in table.iter().enumerate().take(upto).rev() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.term(ctx)));
        match outcome {
            Ok(true) => tracing::debug!(stage = stage.name(), index, "Stage torn down"),
            Ok(false) => tracing::trace!(stage = stage.name(), index, "Stage has no teardown"),
            Err(payload) => tracing::error!(
                stage = stage.name(),
                index,
                panic = %panic_message(payload.as_ref()),
                "Stage teardown panicked, continuing unwind"
            ),
        }
    }
}

/// Tear down every stage and then halt scheduling data and memory.
///
/// The halts run even when the table was never (or only partly) brought
/// up.
pub fn full_shutdown<Ctx: DeviceHalt>(table: &StageTable<Ctx>, ctx: &mut Ctx) {
    unwind(table, ctx, table.len());
    halt_all(ctx);
}

/// Run both halts, scheduling data first.
pub(crate) fn halt_all<Ctx: DeviceHalt>(ctx: &mut Ctx) {
    halt(ctx, "scheduling_data", Ctx::halt_scheduling_data);
    halt(ctx, "memory", Ctx::halt_memory);
}

fn halt<Ctx>(ctx: &mut Ctx, what: &'static str, op: fn(&mut Ctx)) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| op(ctx))) {
        tracing::error!(
            halt = what,
            panic = %panic_message(payload.as_ref()),
            "Halt panicked during shutdown"
        );
    } else {
        tracing::debug!(halt = what, "Halted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{Event, Recorder, recording_table};

    #[test]
    fn test_unwind_prefix_in_reverse() {
        let table = recording_table(&[true, true, true, true]);
        let mut ctx = Recorder::default();

        unwind(&table, &mut ctx, 3);

        assert_eq!(ctx.terms(), vec![2, 1, 0]);
    }

    #[test]
    fn test_unwind_skips_stages_without_term() {
        let table = recording_table(&[true, false, true]);
        let mut ctx = Recorder::default();

        unwind(&table, &mut ctx, 3);

        assert_eq!(ctx.terms(), vec![2, 0]);
    }

    #[test]
    fn test_unwind_zero_is_noop() {
        let table = recording_table(&[true, true]);
        let mut ctx = Recorder::default();

        unwind(&table, &mut ctx, 0);

        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_unwind_clamps_out_of_range_bound() {
        let table = recording_table(&[true, true]);
        let mut ctx = Recorder::default();

        unwind(&table, &mut ctx, 10);

        assert_eq!(ctx.terms(), vec![1, 0]);
    }

    #[test]
    fn test_unwind_continues_after_panicking_term() {
        let mut ctx = Recorder::default();
        ctx.panic_on_term = Some(1);
        let table = recording_table(&[true, true, true]);

        unwind(&table, &mut ctx, 3);

        // Stage 1 panicked before recording; stage 0 still ran.
        assert_eq!(ctx.terms(), vec![2, 0]);
    }

    #[test]
    fn test_full_shutdown_tears_down_everything_then_halts() {
        for len in 0..=3 {
            let table = recording_table(&vec![true; len]);
            let mut ctx = Recorder::default();

            full_shutdown(&table, &mut ctx);

            let mut expected: Vec<Event> = (0..len).rev().map(Event::Term).collect();
            expected.push(Event::HaltScheduling);
            expected.push(Event::HaltMemory);
            assert_eq!(ctx.events, expected, "len={len}");
        }
    }

    #[test]
    fn test_full_shutdown_halts_even_if_first_halt_panics() {
        let table = recording_table(&[true]);
        let mut ctx = Recorder::default();
        ctx.panic_on_halt = true;

        full_shutdown(&table, &mut ctx);

        assert_eq!(ctx.events, vec![Event::Term(0), Event::HaltMemory]);
    }

    #[test]
    fn test_full_shutdown_on_empty_table_still_halts() {
        let table: StageTable<Recorder> = StageTable::new(Vec::new());
        let mut ctx = Recorder::default();

        full_shutdown(&table, &mut ctx);

        assert_eq!(ctx.events, vec![Event::HaltScheduling, Event::HaltMemory]);
    }
}
