//! Driver stage table for the simulated device.
//!
//! Order matters: sysfs groups are created before the misc device is
//! registered, since registration makes the device visible to userspace.

use super::SimDevice;
use crate::options::FeatureSet;
use crate::pipeline::{StageDescriptor, StageTable};

/// Stage names of the late backend group, in bring-up order.
pub const BACKEND_STAGES: &[&str] = &[
    "hwaccess_pm",
    "reset_gpu",
    "pm_powerup",
    "backend_timer",
    "interrupt_test",
    "job_slot",
    "devfreq",
    "update_l2_features",
];

/// Stage that attaches a resource named after itself and detaches it on term.
fn held(name: &'static str, label: &'static str) -> StageDescriptor<SimDevice> {
    StageDescriptor::new(name, label, move |dev: &mut SimDevice| {
        dev.enter(name)?;
        dev.acquire(name);
        Ok(())
    })
    .with_term(move |dev: &mut SimDevice| dev.release(name, name))
}

/// Stage that only records probed values; nothing to undo.
fn probe(
    name: &'static str,
    label: &'static str,
    apply: fn(&mut SimDevice),
) -> StageDescriptor<SimDevice> {
    StageDescriptor::new(name, label, move |dev: &mut SimDevice| {
        dev.enter(name)?;
        apply(dev);
        Ok(())
    })
}

fn assign_irqs(dev: &mut SimDevice) {
    dev.irqs = Some([33, 34, 35]);
}

fn populate_max_freq(dev: &mut SimDevice) {
    dev.max_freq_khz = Some(800_000);
}

fn coherency_init(dev: &mut SimDevice) {
    dev.coherency_mode = Some("ace-lite");
}

fn update_l2_features(dev: &mut SimDevice) {
    dev.l2_slices = Some(2);
}

/// Interrupt assignment self-test, debug builds with real hardware only.
fn interrupt_test(_dev: &mut SimDevice) {}

/// Late backend initialization: power, reset, timers, job slots, devfreq.
pub fn backend_table(features: &FeatureSet) -> StageTable<SimDevice> {
    StageTable::builder()
        .stage(held("hwaccess_pm", "Power management backend initialization failed"))
        .stage(held("reset_gpu", "GPU reset initialization failed"))
        // term is the power-management halt
        .stage(held("pm_powerup", "GPU power up failed"))
        .stage(held("backend_timer", "Backend timer initialization failed"))
        .stage_if(
            features.debug && !features.dummy_model,
            probe("interrupt_test", "Interrupt assignment check failed", interrupt_test),
        )
        .stage(held("job_slot", "Job slot initialization failed"))
        .stage(held("devfreq", "Devfreq initialization failed"))
        .stage(probe(
            "update_l2_features",
            "L2 features update failed",
            update_l2_features,
        ))
        .build()
}

/// Full device stage table for `features`.
pub fn stage_table(features: &FeatureSet) -> StageTable<SimDevice> {
    let hw = !features.dummy_model;
    let kbase = features.kbase_build;

    StageTable::builder()
        .stage_if(features.dummy_model, held("gpu_device_create", "Dummy model initialization failed"))
        .stage_if(hw, probe("assign_irqs", "IRQ search failed", assign_irqs))
        .stage_if(hw, held("registers_map", "Register map failed"))
        .stage(held("io_history", "Register access history initialization failed"))
        .stage(held("pm", "Power management initialization failed"))
        .stage(held("early", "Early device initialization failed"))
        .stage(probe("populate_max_freq", "Populating max frequency failed", populate_max_freq))
        .stage(held("misc", "Miscellaneous device initialization failed"))
        .stage(held("ctx_sched", "Context scheduler initialization failed"))
        .stage(held("mem", "Memory subsystem initialization failed"))
        .stage(probe("coherency", "Device coherency init failed", coherency_init))
        .stage(held("protected_mode", "Protected mode subsystem initialization failed"))
        .stage(held("device_list", "Device list setup failed"))
        .stage(held("js_devdata", "Job JS devdata initialization failed"))
        .stage(held("timeline", "Timeline stream initialization failed"))
        .stage(held("clk_rate_trace", "Clock rate trace manager initialization failed"))
        .stage(held("hwcnt_backend", "GPU hwcnt backend creation failed"))
        .stage(held("hwcnt_context", "GPU hwcnt context initialization failed"))
        .stage(held("hwcnt_virtualizer", "GPU hwcnt virtualizer initialization failed"))
        .stage(held("vinstr", "Virtual instrumentation initialization failed"))
        .stage(backend_table(features).into_group("backend_late", "Late backend initialization failed"))
        .stage_if(kbase, held("debug_job_fault", "Job fault debug initialization failed"))
        .stage_if(kbase, held("debugfs", "DebugFS initialization failed"))
        .stage_if(kbase, held("sysfs", "SysFS group creation failed"))
        .stage_if(kbase, held("misc_register", "Misc device registration failed"))
        .stage_if(kbase && features.buslog, held("buslog", "Bus log client registration failed"))
        .stage_if(kbase, held("gpuprops_user_buffer", "GPU property population failed"))
        .stage(held("dummy_job_wa", "Dummy job workaround load failed"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{DeviceOptions, WorkerFailurePolicy};
    use crate::sim::{FaultKind, FaultPlan, SimEvent, build_device};
    use crate::workers::{FaultySpawner, PriorityFault, WorkerKind};
    use crate::{BringupError, DeviceState};

    fn all_features() -> FeatureSet {
        FeatureSet {
            dummy_model: false,
            debug: true,
            kbase_build: true,
            buslog: true,
        }
    }

    fn options_with(features: FeatureSet) -> DeviceOptions {
        DeviceOptions {
            features,
            ..Default::default()
        }
    }

    /// Every stage name that can fail, nested backend stages included. The
    /// group itself has no fault point of its own.
    fn failable_stages(features: &FeatureSet) -> Vec<&'static str> {
        let mut names: Vec<_> = stage_table(features)
            .names()
            .into_iter()
            .filter(|name| *name != "backend_late")
            .collect();
        names.extend(backend_table(features).names());
        names
    }

    #[test]
    fn test_default_table_uses_real_hardware_stages() {
        let names = stage_table(&FeatureSet::default()).names();

        assert_eq!(names.first(), Some(&"assign_irqs"));
        assert!(names.contains(&"registers_map"));
        assert!(!names.contains(&"gpu_device_create"));
        assert!(!names.contains(&"buslog"));
        assert_eq!(names.last(), Some(&"dummy_job_wa"));
    }

    #[test]
    fn test_dummy_model_replaces_irq_and_register_stages() {
        let features = FeatureSet {
            dummy_model: true,
            debug: true,
            ..Default::default()
        };
        let names = stage_table(&features).names();

        assert_eq!(names.first(), Some(&"gpu_device_create"));
        assert!(!names.contains(&"assign_irqs"));
        assert!(!names.contains(&"registers_map"));
        assert!(!backend_table(&features).names().contains(&"interrupt_test"));
    }

    #[test]
    fn test_minimal_build_drops_user_interfaces() {
        let features = FeatureSet {
            kbase_build: false,
            buslog: true,
            ..Default::default()
        };
        let names = stage_table(&features).names();

        for stage in ["debugfs", "sysfs", "misc_register", "buslog", "gpuprops_user_buffer"] {
            assert!(!names.contains(&stage), "{stage} should be absent");
        }
    }

    #[test]
    fn test_sysfs_precedes_misc_register() {
        let table = stage_table(&all_features());
        let sysfs = table.position("sysfs").unwrap();
        let misc = table.position("misc_register").unwrap();
        assert!(sysfs < misc);
    }

    #[test]
    fn test_backend_stage_list_matches_table() {
        assert_eq!(backend_table(&all_features()).names(), BACKEND_STAGES.to_vec());
    }

    #[test]
    fn test_full_bringup_and_shutdown_is_clean() {
        let mut dev = build_device(&options_with(all_features()), FaultPlan::default())
            .unwrap()
            .with_spawner(FaultySpawner::default().priority(PriorityFault::Grant));

        dev.init().unwrap();

        assert!(dev.ctx().holds("registers_map"));
        assert!(dev.ctx().holds("devfreq"));
        assert_eq!(dev.ctx().max_freq_khz, Some(800_000));
        assert_eq!(dev.ctx().irqs, Some([33, 34, 35]));
        assert_eq!(dev.ctx().l2_slices, Some(2));

        dev.term();

        let ctx = dev.ctx();
        assert!(ctx.is_clean(), "leftover: {:?}", ctx.resources());
        assert!(ctx.scheduling_halted && ctx.memory_halted);
        assert_eq!(
            &ctx.journal()[ctx.journal().len() - 2..],
            &[SimEvent::Halt("scheduling_data"), SimEvent::Halt("memory")]
        );
        for stage in failable_stages(&all_features()) {
            assert!(ctx.term_count(stage) <= 1, "{stage} torn down twice");
        }
    }

    #[test]
    fn test_failure_at_any_stage_leaves_device_clean() {
        let features = all_features();
        for stage in failable_stages(&features) {
            let mut dev = build_device(&options_with(features.clone()), FaultPlan::default().fail_stage(stage))
                .unwrap()
                .with_spawner(FaultySpawner::default().priority(PriorityFault::Grant));

            let err = dev.init().unwrap_err();
            assert!(err.failed_stage().is_some(), "{stage}: {err}");
            assert!(dev.ctx().resources().is_empty(), "{stage}: leftover {:?}", dev.ctx().resources());

            dev.term();
            assert!(dev.ctx().is_clean(), "{stage}: not clean after term");
            assert_eq!(dev.state(), DeviceState::Terminated);
        }
    }

    #[test]
    fn test_nested_failure_reports_group_and_inner_stage() {
        let faults = FaultPlan::default().fail_with("job_slot", FaultKind::OutOfMemory);
        let mut dev = build_device(&options_with(all_features()), faults).unwrap();

        let err = dev.init().unwrap_err();

        let index = stage_table(&all_features()).position("backend_late").unwrap();
        assert_eq!(err.failed_stage(), Some(index));
        assert_eq!(err.code(), -libc::ENOMEM);
        match err {
            BringupError::Stage { source, label, .. } => {
                assert_eq!(label, "Late backend initialization failed");
                assert_eq!(source.failed_stage(), Some(BACKEND_STAGES.iter().position(|s| *s == "job_slot").unwrap()));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Backend stages before job_slot were unwound by the group itself.
        assert_eq!(dev.ctx().term_count("backend_timer"), 1);
        assert_eq!(dev.ctx().term_count("devfreq"), 0);
    }

    #[test]
    fn test_panicking_term_does_not_stop_shutdown() {
        let faults = FaultPlan::default().panic_on_term("timeline");
        let mut dev = build_device(&options_with(all_features()), faults)
            .unwrap()
            .with_spawner(FaultySpawner::default().priority(PriorityFault::Grant));

        dev.init().unwrap();
        dev.term();

        let ctx = dev.ctx();
        assert_eq!(ctx.resources(), vec!["timeline"]);
        assert_eq!(ctx.term_count("io_history"), 1);
        assert!(ctx.memory_halted);
    }

    #[test]
    fn test_worker_failure_policies_on_sim_device() {
        for (policy, expect_live) in [(WorkerFailurePolicy::Retain, true), (WorkerFailurePolicy::Unwind, false)] {
            let mut options = options_with(FeatureSet::default());
            options.workers.on_failure = policy;
            let mut dev = build_device(&options, FaultPlan::default())
                .unwrap()
                .with_spawner(FaultySpawner::default().fail_spawn(WorkerKind::Event));

            assert!(dev.init().unwrap_err().is_worker_spawn());
            assert_eq!(dev.ctx().holds("mem"), expect_live, "{policy:?}");

            dev.term();
            assert!(dev.ctx().is_clean(), "{policy:?}");
        }
    }
}
