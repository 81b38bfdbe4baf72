//! `bringup-sim`: bring a simulated device up and down and print what happened.

use anyhow::Context;
use bringup::sim::{self, FaultPlan, SimDevice, SimEvent};
use bringup::workers::{FaultySpawner, PriorityFault};
use bringup::{Device, DeviceOptions, WorkerFailurePolicy, WorkerKind, init_logging};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Simulated device bring-up.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON options file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Fail `init` of the named stage. May be repeated.
    #[arg(long = "fail", value_name = "STAGE")]
    fail: Vec<String>,
    /// Make `term` of the named stage panic. May be repeated.
    #[arg(long = "panic-term", value_name = "STAGE")]
    panic_term: Vec<String>,
    /// Fail creation of one of the workers.
    #[arg(long, value_enum)]
    fail_worker: Option<WorkerArg>,
    /// Refuse the real-time priority request.
    #[arg(long, conflicts_with = "grant_rt")]
    deny_rt: bool,
    /// Pretend the real-time priority request succeeded.
    #[arg(long)]
    grant_rt: bool,
    /// Do not ask for real-time priority at all.
    #[arg(long)]
    no_rt: bool,
    /// Leave stages up when a worker cannot be created.
    #[arg(long)]
    retain_on_worker_failure: bool,
    /// Use the dummy hardware model.
    #[arg(long)]
    dummy_model: bool,
    /// Enable debug-only stages.
    #[arg(long)]
    debug: bool,
    /// Also write logs to a daily-rolling file in this directory.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum WorkerArg {
    Completion,
    Event,
}

impl From<WorkerArg> for WorkerKind {
    fn from(arg: WorkerArg) -> Self {
        match arg {
            WorkerArg::Completion => WorkerKind::Completion,
            WorkerArg::Event => WorkerKind::Event,
        }
    }
}

#[derive(Serialize)]
struct Report<'a> {
    device: u32,
    stages: Vec<&'static str>,
    outcome: Outcome,
    realtime_priority: Option<i32>,
    work_items_run: usize,
    metrics: Option<&'a bringup::pipeline::PipelineMetrics>,
    journal: Vec<SimEvent>,
    leaked: Vec<&'static str>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Ok,
    Failed {
        error: String,
        code: i32,
        stage: Option<usize>,
    },
}

fn options(cli: &Cli) -> anyhow::Result<DeviceOptions> {
    let mut options = match &cli.config {
        Some(path) => DeviceOptions::from_file(path)?,
        None => DeviceOptions::default(),
    };
    options.features.dummy_model |= cli.dummy_model;
    options.features.debug |= cli.debug;
    if cli.no_rt {
        options.workers.elevate_priority = false;
    }
    if cli.retain_on_worker_failure {
        options.workers.on_failure = WorkerFailurePolicy::Retain;
    }
    options.sanitize()?;
    Ok(options)
}

fn spawner(cli: &Cli) -> FaultySpawner {
    let mut spawner = FaultySpawner::default();
    if let Some(worker) = cli.fail_worker {
        spawner = spawner.fail_spawn(worker.into());
    }
    if cli.deny_rt {
        spawner = spawner.priority(PriorityFault::Deny);
    } else if cli.grant_rt {
        spawner = spawner.priority(PriorityFault::Grant);
    }
    spawner
}

fn queue_probe_items(device: &Device<SimDevice>, counter: &Arc<AtomicUsize>) -> anyhow::Result<()> {
    let Some(workers) = device.workers() else {
        return Ok(());
    };
    let completion = Arc::clone(counter);
    workers
        .queue_completion(Box::new(move || {
            completion.fetch_add(1, Ordering::SeqCst);
        }))
        .context("queue completion item")?;
    let event = Arc::clone(counter);
    workers
        .queue_event(Box::new(move || {
            event.fetch_add(1, Ordering::SeqCst);
        }))
        .context("queue event item")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.as_deref())?;

    let options = options(&cli)?;
    let mut faults = FaultPlan::default();
    for stage in &cli.fail {
        faults = faults.fail_stage(stage);
    }
    for stage in &cli.panic_term {
        faults = faults.panic_on_term(stage);
    }

    let mut device = sim::build_device(&options, faults)?.with_spawner(spawner(&cli));
    let stages = device.table().names();

    let outcome = match device.init() {
        Ok(()) => Outcome::Ok,
        Err(e) => Outcome::Failed {
            error: e.to_string(),
            code: e.code(),
            stage: e.failed_stage(),
        },
    };

    let counter = Arc::new(AtomicUsize::new(0));
    queue_probe_items(&device, &counter)?;
    let realtime_priority = device.workers().and_then(|w| w.realtime_priority());
    let metrics = device.metrics().cloned();

    // Joins the workers, so queued items have run afterwards.
    device.term();

    let report = Report {
        device: device.id(),
        stages,
        outcome,
        realtime_priority,
        work_items_run: counter.load(Ordering::SeqCst),
        metrics: metrics.as_ref(),
        journal: device.ctx().journal().to_vec(),
        leaked: device.ctx().resources(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !device.ctx().is_clean() {
        anyhow::bail!("device left resources attached: {:?}", report.leaked);
    }
    Ok(())
}
