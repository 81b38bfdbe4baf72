//! Bring-up constants.
//!
//! Centralized location for worker and logging configuration values.

/// Background worker configuration
pub mod workers {
    /// Thread name of the completion-notification worker
    pub const COMPLETION_WORKER_NAME: &str = "bringup_jd";

    /// Thread name of the event worker
    pub const EVENT_WORKER_NAME: &str = "bringup_event";

    /// SCHED_FIFO priority requested for the completion worker
    pub const COMPLETION_WORKER_RT_PRIORITY: i32 = 60;

    /// Valid SCHED_FIFO priority range on Linux
    pub const MIN_RT_PRIORITY: i32 = 1;
    pub const MAX_RT_PRIORITY: i32 = 99;

    /// Linux truncates thread names beyond this many bytes
    pub const MAX_THREAD_NAME_LEN: usize = 15;
}

/// Logging configuration
pub mod logging {
    /// Filter used when RUST_LOG is unset
    pub const DEFAULT_FILTER: &str = "info";

    /// File name prefix for rolling log files
    pub const LOG_FILE_PREFIX: &str = "bringup.log";
}
