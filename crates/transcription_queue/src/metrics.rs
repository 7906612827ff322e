use crate::error::QueueError;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

#[derive(Clone)]
pub struct QueueMetrics {
	pub jobs_created: IntCounter,
	pub jobs_completed: IntCounter,
	pub jobs_failed: IntCounter,
	pub jobs_swept: IntCounter,
	pub jobs_running: IntGauge,
	pub admission_wait: Histogram,
}

impl QueueMetrics {
	pub fn new(registry: &Registry) -> Result<Self, QueueError> {
		let jobs_created = IntCounter::new("job_queue_jobs_created", "Total jobs created")?;
		let jobs_completed = IntCounter::new("job_queue_jobs_completed", "Total jobs completed successfully")?;
		let jobs_failed = IntCounter::new("job_queue_jobs_failed", "Total jobs that ended in failure")?;
		let jobs_swept = IntCounter::new("job_queue_jobs_swept", "Total finished jobs removed by cleanup")?;
		let jobs_running = IntGauge::new("job_queue_jobs_running", "Jobs currently holding an admission slot")?;
		let admission_wait = Histogram::with_opts(HistogramOpts::new(
			"job_queue_admission_wait_seconds",
			"Time jobs spent waiting for an admission slot",
		))?;

		registry.register(Box::new(jobs_created.clone()))?;
		registry.register(Box::new(jobs_completed.clone()))?;
		registry.register(Box::new(jobs_failed.clone()))?;
		registry.register(Box::new(jobs_swept.clone()))?;
		registry.register(Box::new(jobs_running.clone()))?;
		registry.register(Box::new(admission_wait.clone()))?;

		Ok(Self {
			jobs_created,
			jobs_completed,
			jobs_failed,
			jobs_swept,
			jobs_running,
			admission_wait,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_metrics_are_registered() {
		let registry = Registry::new();
		let metrics = QueueMetrics::new(&registry).unwrap();
		metrics.jobs_created.inc();

		let names: Vec<String> = registry.gather().iter().map(|family| family.get_name().to_string()).collect();
		assert!(names.contains(&"job_queue_jobs_created".to_string()));
		assert!(names.contains(&"job_queue_admission_wait_seconds".to_string()));
	}

	#[test]
	fn test_double_registration_is_an_error() {
		let registry = Registry::new();
		QueueMetrics::new(&registry).unwrap();
		assert!(matches!(QueueMetrics::new(&registry), Err(QueueError::PrometheusError(_))));
	}
}
