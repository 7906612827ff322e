use crate::job::JobId;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
	#[error("Job not found: {0}")]
	NotFound(JobId),
	#[error("Admission controller closed")]
	AdmissionClosed,
	#[error("Pipeline timed out after {0:?}")]
	Timeout(Duration),
	#[error("Invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("Prometheus error: {0}")]
	PrometheusError(#[from] prometheus::Error),
}

impl From<tokio::sync::AcquireError> for QueueError {
	fn from(_: tokio::sync::AcquireError) -> Self {
		Self::AdmissionClosed
	}
}
