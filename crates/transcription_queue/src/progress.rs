//! Progress reporting from a pipeline back to its job.
//!
//! A pipeline never touches the store. It reports `(stage, percent)` pairs
//! through a [`ProgressReporter`]. The queue runs the pipeline future on the
//! job's own task and applies each report to the store before `report`
//! returns, so reports land in the order issued and a poll made after a
//! report already sees it.

use crate::job::{JobStatus, JobUpdate};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Known pipeline stages and the job phase they map to. Anything not listed
/// maps to [`JobStatus::Processing`].
const STAGE_TABLE: &[(&str, JobStatus)] = &[
	("loading_audio", JobStatus::Processing),
	("transcribing", JobStatus::Transcribing),
	("aligning", JobStatus::Aligning),
	("diarizing", JobStatus::Diarizing),
	("processing", JobStatus::Processing),
	// the runner decides when a job is really completed
	("completed", JobStatus::Processing),
];

pub fn stage_status(stage: &str) -> JobStatus {
	STAGE_TABLE
		.iter()
		.find_map(|(name, status)| (*name == stage).then_some(*status))
		.unwrap_or(JobStatus::Processing)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
	pub stage: String,
	pub percent: f64,
}

impl ProgressEvent {
	pub fn to_update(&self) -> JobUpdate {
		JobUpdate::status(stage_status(&self.stage))
			.with_progress(self.percent)
			.with_message(format!("Status: {}", self.stage))
	}
}

type Sink = dyn Fn(ProgressEvent) + Send + Sync;

/// Callback handle given to a pipeline run.
///
/// `report` is synchronous and never waits on the runtime, so it can be
/// called from async code and from `spawn_blocking` threads alike. Reports
/// made after the job finished are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
	sink: Arc<Sink>,
}

impl ProgressReporter {
	pub fn new(sink: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
		Self { sink: Arc::new(sink) }
	}

	/// A reporter that forwards events to a channel instead of a job.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let reporter = Self::new(move |event| {
			// nobody listening is not an error
			let _ = tx.send(event);
		});
		(reporter, rx)
	}

	/// A reporter whose reports go nowhere.
	pub fn disconnected() -> Self {
		Self::new(|_| {})
	}

	pub fn report(&self, stage: &str, percent: f64) {
		(self.sink)(ProgressEvent {
			stage: stage.to_string(),
			percent,
		});
	}
}

impl fmt::Debug for ProgressReporter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProgressReporter").finish_non_exhaustive()
	}
}
