//! Recording context for exercising the sequencer and teardown driver.

use super::stage::StageDescriptor;
use super::table::StageTable;
use super::teardown::DeviceHalt;
use bringup_shared::errors::BringupError;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

const NAMES: [&str; 16] = [
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12", "s13", "s14",
    "s15",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Init(usize),
    Term(usize),
    HaltScheduling,
    HaltMemory,
}

#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub events: Vec<Event>,
    pub fail_at: Option<usize>,
    pub panic_at: Option<usize>,
    pub panic_on_term: Option<usize>,
    pub panic_on_halt: bool,
}

impl Recorder {
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub fn inits(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Init(i) => Some(*i),
                _ => None,
            })
            .collect()
    }

    pub fn terms(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Term(i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

impl DeviceHalt for Recorder {
    fn halt_scheduling_data(&mut self) {
        if self.panic_on_halt {
            panic!("scheduling data halt blew up");
        }
        self.events.push(Event::HaltScheduling);
    }

    fn halt_memory(&mut self) {
        self.events.push(Event::HaltMemory);
    }
}

/// One stage per entry; the flag says whether the stage has a `term`.
pub(crate) fn recording_table(has_term: &[bool]) -> StageTable<Recorder> {
    let stages = has_term
        .iter()
        .enumerate()
        .map(|(index, &with_term)| recording_stage(index, with_term))
        .collect();
    StageTable::new(stages)
}

pub(crate) fn recording_stage(index: usize, with_term: bool) -> StageDescriptor<Recorder> {
    let stage = StageDescriptor::new(NAMES[index], "recorded stage failed", move |ctx: &mut Recorder| {
        ctx.events.push(Event::Init(index));
        if ctx.panic_at == Some(index) {
            panic!("stage {index} panicked");
        }
        if ctx.fail_at == Some(index) {
            return Err(BringupError::Device(format!("stage {index} refused")));
        }
        Ok(())
    });

    if with_term {
        stage.with_term(move |ctx: &mut Recorder| {
            if ctx.panic_on_term == Some(index) {
                panic!("stage {index} teardown panicked");
            }
            ctx.events.push(Event::Term(index));
        })
    } else {
        stage
    }
}

/// In-memory log sink for asserting on emitted diagnostics.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged, one
/// event per line, formatted as `LEVEL message field=value ...`.
///
/// Only events from the calling thread are captured.
pub(crate) fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock()).into_owned();
    (result, logs)
}

/// Lines of `logs` emitted at `level` ("ERROR", "WARN", "INFO", ...).
pub(crate) fn lines_at<'a>(logs: &'a str, level: &str) -> Vec<&'a str> {
    logs.lines()
        .filter(|line| line.trim_start().starts_with(level))
        .collect()
}
