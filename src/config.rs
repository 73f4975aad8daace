//! Scheduler startup configuration.

use crate::error::SchedulerError;

/// Tunables for a single [`Scheduler::run`](crate::Scheduler::run) invocation.
///
/// Mirrors the builder-style configuration object idiom: construct with [`SchedulerConfig::new`]
/// (equivalent to [`Default::default`]), adjust the fields that matter, then validate.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of fibers pre-allocated for running tasks. Must be large enough to cover every
    /// fiber that could simultaneously be in flight (running or parked on a counter) at once;
    /// running out mid-`Run` is a fatal precondition violation, not a recoverable error.
    pub fiber_pool_size: usize,

    /// Stack size, in bytes, allocated for each pooled fiber.
    pub fiber_stack_size: usize,

    /// Number of worker OS threads to spawn. Defaults to the number of logical CPUs.
    pub worker_thread_count: usize,

    /// Optional cap on the number of tasks that may be queued at once. `None` means unbounded.
    pub task_queue_capacity: Option<usize>,
}

impl SchedulerConfig {
    pub fn new() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    /// Checks the configuration for internally inconsistent values before `Run` allocates
    /// anything based on them.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.fiber_pool_size == 0 {
            return Err(SchedulerError::InvalidConfig(
                "fiber_pool_size must be at least 1".into(),
            ));
        }
        if self.fiber_stack_size < 4096 {
            return Err(SchedulerError::InvalidConfig(
                "fiber_stack_size must be at least 4096 bytes".into(),
            ));
        }
        if self.worker_thread_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "worker_thread_count must be at least 1".into(),
            ));
        }
        if let Some(capacity) = self.task_queue_capacity {
            if capacity == 0 {
                return Err(SchedulerError::InvalidConfig(
                    "task_queue_capacity must be at least 1 when set".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> SchedulerConfig {
        SchedulerConfig {
            fiber_pool_size: 128,
            fiber_stack_size: 512 * 1024,
            worker_thread_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            task_queue_capacity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config = SchedulerConfig {
            fiber_pool_size: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let config = SchedulerConfig {
            task_queue_capacity: Some(0),
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
