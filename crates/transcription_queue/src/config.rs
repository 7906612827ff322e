use crate::error::QueueError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_HOUR: u64 = 3600;

// Queue tuning knobs, read from flags or the environment.
#[derive(Parser, Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
	#[arg(long, env = "MAX_CONCURRENT_TASKS", default_value = "2", help = "Maximum number of jobs whose pipeline runs at the same time")]
	pub max_concurrent_tasks: usize,

	#[arg(
        long = "task-timeout-secs",
        env = "TASK_TIMEOUT_SECONDS",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Pipeline timeout in seconds"
    )]
	pub task_timeout: Duration,

	#[arg(
        long = "cleanup-after-hours",
        env = "CLEANUP_AFTER_HOURS",
        default_value = "24",
        value_parser = parse_hours,
        help = "Age in hours after which finished jobs are swept"
    )]
	pub cleanup_after: Duration,

	#[arg(
        long = "cleanup-interval-secs",
        env = "CLEANUP_INTERVAL_SECS",
        default_value = "3600",
        value_parser = parse_duration,
        help = "Delay between cleanup sweeps in seconds"
    )]
	pub cleanup_interval: Duration,
}

impl QueueConfig {
	pub fn new() -> Self {
		Self::parse()
	}

	/// Validate configuration values
	pub fn validate(&self) -> Result<(), QueueError> {
		if self.max_concurrent_tasks == 0 {
			return Err(QueueError::InvalidConfig("max_concurrent_tasks must be at least 1".to_string()));
		}

		if self.task_timeout.is_zero() {
			return Err(QueueError::InvalidConfig("task_timeout must be greater than 0".to_string()));
		}

		if self.cleanup_interval.is_zero() {
			return Err(QueueError::InvalidConfig("cleanup_interval must be greater than 0".to_string()));
		}

		Ok(())
	}

	#[cfg(test)]
	pub fn test() -> Self {
		Self {
			max_concurrent_tasks: 1,
			task_timeout: Duration::from_secs(5),
			cleanup_after: Duration::from_secs(1),
			cleanup_interval: Duration::from_secs(1),
		}
	}
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			max_concurrent_tasks: 2,
			task_timeout: Duration::from_secs(3600),
			cleanup_after: Duration::from_secs(24 * SECS_PER_HOUR),
			cleanup_interval: Duration::from_secs(3600),
		}
	}
}

fn parse_duration(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(Duration::from_secs)
}

fn parse_hours(s: &str) -> Result<Duration, std::num::ParseIntError> {
	s.parse::<u64>().map(|hours| Duration::from_secs(hours.saturating_mul(SECS_PER_HOUR)))
}
