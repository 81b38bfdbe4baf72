//! Device bring-up options.
//!
//! Options are plain serde structs so they can be loaded from a JSON file.
//! Every field has a default; an empty object is a valid configuration.

use crate::constants::workers;
use bringup_shared::errors::{BringupError, BringupResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level options for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    /// Optional stage-table membership.
    pub features: FeatureSet,
    /// Background worker configuration.
    pub workers: WorkerOptions,
}

impl DeviceOptions {
    /// Load options from a JSON file.
    pub fn from_file(path: &Path) -> BringupResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BringupError::Config(format!("Failed to read options {}: {}", path.display(), e))
        })?;
        let options: Self = serde_json::from_str(&raw).map_err(|e| {
            BringupError::Config(format!("Failed to parse options {}: {}", path.display(), e))
        })?;
        options.sanitize()?;
        Ok(options)
    }

    /// Validate option values.
    pub fn sanitize(&self) -> BringupResult<()> {
        self.workers.sanitize()
    }
}

/// Feature switches that decide which optional stages a table contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    /// Replace IRQ assignment and register mapping with a dummy hardware model.
    pub dummy_model: bool,
    /// Enable debug-only stages (interrupt assignment self-test).
    pub debug: bool,
    /// Full driver build: debug interfaces, sysfs, misc device, user-visible properties.
    pub kbase_build: bool,
    /// Register a bus log client.
    pub buslog: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            dummy_model: false,
            debug: false,
            kbase_build: true,
            buslog: false,
        }
    }
}

/// What to do with the brought-up stages when a worker cannot be created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFailurePolicy {
    /// Unwind the whole stage table, as for a stage failure.
    #[default]
    Unwind,
    /// Leave every stage up and only report the failure. The caller is
    /// then responsible for a full teardown.
    Retain,
}

/// Background worker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    pub completion_name: String,
    pub event_name: String,
    /// SCHED_FIFO priority requested for the completion worker.
    pub completion_priority: i32,
    /// Try to raise the completion worker's priority at all.
    pub elevate_priority: bool,
    pub on_failure: WorkerFailurePolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            completion_name: workers::COMPLETION_WORKER_NAME.to_string(),
            event_name: workers::EVENT_WORKER_NAME.to_string(),
            completion_priority: workers::COMPLETION_WORKER_RT_PRIORITY,
            elevate_priority: true,
            on_failure: WorkerFailurePolicy::default(),
        }
    }
}

impl WorkerOptions {
    pub fn sanitize(&self) -> BringupResult<()> {
        if !(workers::MIN_RT_PRIORITY..=workers::MAX_RT_PRIORITY).contains(&self.completion_priority) {
            return Err(BringupError::Config(format!(
                "completion_priority must be in {}..={}, got {}",
                workers::MIN_RT_PRIORITY,
                workers::MAX_RT_PRIORITY,
                self.completion_priority
            )));
        }

        for name in [&self.completion_name, &self.event_name] {
            if name.is_empty() {
                return Err(BringupError::Config("worker name must not be empty".into()));
            }
            if name.contains('\0') {
                return Err(BringupError::Config(format!("worker name {:?} contains a NUL byte", name)));
            }
            if name.len() > workers::MAX_THREAD_NAME_LEN {
                tracing::warn!(worker = %name, "Worker name will be truncated by the kernel");
            }
        }

        if self.completion_name == self.event_name {
            return Err(BringupError::Config(format!(
                "worker names must differ, both are {}",
                self.completion_name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let options: DeviceOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, DeviceOptions::default());
        assert_eq!(options.workers.completion_priority, 60);
        assert_eq!(options.workers.on_failure, WorkerFailurePolicy::Unwind);
        assert!(options.features.kbase_build);
    }

    #[test]
    fn test_partial_file_overrides_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"features": {{"dummy_model": true}}, "workers": {{"on_failure": "retain", "completion_priority": 10}}}}"#
        )
        .unwrap();

        let options = DeviceOptions::from_file(file.path()).unwrap();

        assert!(options.features.dummy_model);
        assert!(options.features.kbase_build);
        assert_eq!(options.workers.on_failure, WorkerFailurePolicy::Retain);
        assert_eq!(options.workers.completion_priority, 10);
    }

    #[test]
    fn test_priority_out_of_range_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"workers": {{"completion_priority": 120}}}}"#).unwrap();

        let err = DeviceOptions::from_file(file.path()).unwrap_err();

        assert!(matches!(err, BringupError::Config(_)));
        assert!(err.to_string().contains("completion_priority"));
    }

    #[test]
    fn test_identical_worker_names_are_rejected() {
        let opts = WorkerOptions {
            event_name: workers::COMPLETION_WORKER_NAME.to_string(),
            ..Default::default()
        };
        assert!(opts.sanitize().is_err());
    }

    #[test]
    fn test_worker_name_with_nul_is_rejected() {
        let mut options = DeviceOptions::default();
        options.workers.event_name = "evt\0x".to_string();

        assert!(matches!(options.sanitize(), Err(BringupError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = DeviceOptions::from_file(Path::new("/nonexistent/bringup.json")).unwrap_err();
        assert!(matches!(err, BringupError::Config(_)));
    }
}
