use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier. Generated once per job and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for JobId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for JobId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// Job lifecycle.
///
/// `Pending -> {Processing | Transcribing | Aligning | Diarizing} -> {Completed | Failed}`
///
/// The four running phases only exist for observability; they all count as
/// "running" and may follow each other in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Pending,
	Processing,
	Transcribing,
	Aligning,
	Diarizing,
	Completed,
	Failed,
}

impl JobStatus {
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}

	pub const fn is_running(self) -> bool {
		matches!(self, Self::Processing | Self::Transcribing | Self::Aligning | Self::Diarizing)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Transcribing => "transcribing",
			Self::Aligning => "aligning",
			Self::Diarizing => "diarizing",
			Self::Completed => "completed",
			Self::Failed => "failed",
		}
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Snapshot of a single job.
///
/// `input` is kept on the record so the runner can read it at execution
/// start, but it is never serialized. `result` is only populated on
/// snapshots handed out by the store, and only once the job completed.
#[derive(Debug, Clone, Serialize)]
#[serde(bound(serialize = "R: Serialize"))]
pub struct Job<I, R> {
	pub id: JobId,
	pub status: JobStatus,
	pub progress: f64,
	pub message: String,
	pub created_at: DateTime<Utc>,
	pub started_at: Option<DateTime<Utc>>,
	pub completed_at: Option<DateTime<Utc>>,
	pub error: Option<String>,
	#[serde(skip_serializing)]
	pub input: I,
	pub result: Option<R>,
}

impl<I, R> Job<I, R> {
	pub(crate) fn new(input: I) -> Self {
		Self {
			id: JobId::new(),
			status: JobStatus::Pending,
			progress: 0.0,
			message: "Job queued".to_string(),
			created_at: Utc::now(),
			started_at: None,
			completed_at: None,
			error: None,
			input,
			result: None,
		}
	}

	pub const fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}

	/// Merge a partial update into the record.
	///
	/// Terminal records are frozen: the whole update is dropped and `false`
	/// is returned.
	pub(crate) fn apply(&mut self, update: JobUpdate) -> bool {
		if self.is_terminal() {
			return false;
		}

		if let Some(status) = update.status {
			let now = Utc::now();
			self.status = status;
			if status.is_running() && self.started_at.is_none() {
				self.started_at = Some(now);
			}
			if status.is_terminal() && self.completed_at.is_none() {
				self.completed_at = Some(now);
			}
		}

		if let Some(progress) = update.progress {
			if !progress.is_nan() {
				self.progress = progress.clamp(0.0, 100.0);
			}
		}

		if let Some(message) = update.message {
			self.message = message;
		}

		if self.status == JobStatus::Failed {
			self.error = Some(update.error.unwrap_or_else(|| "unknown error".to_string()));
		}

		true
	}
}

/// Partial update merged atomically into a [`Job`] by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
	pub status: Option<JobStatus>,
	pub progress: Option<f64>,
	pub message: Option<String>,
	pub error: Option<String>,
}

impl JobUpdate {
	pub fn status(status: JobStatus) -> Self {
		Self {
			status: Some(status),
			..Self::default()
		}
	}

	pub fn failed(error: impl Into<String>) -> Self {
		Self {
			status: Some(JobStatus::Failed),
			error: Some(error.into()),
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_progress(mut self, progress: f64) -> Self {
		self.progress = Some(progress);
		self
	}

	#[must_use]
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}
}

/// Job counts by status, recomputed on every call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
	pub pending: usize,
	pub running: usize,
	pub completed: usize,
	pub failed: usize,
	pub total: usize,
}

#[cfg(test)]
mod tests {
	use super::*;

	type TestJob = Job<&'static str, String>;

	#[test]
	fn test_status_classification() {
		assert!(!JobStatus::Pending.is_running());
		assert!(!JobStatus::Pending.is_terminal());
		for status in [JobStatus::Processing, JobStatus::Transcribing, JobStatus::Aligning, JobStatus::Diarizing] {
			assert!(status.is_running());
			assert!(!status.is_terminal());
		}
		assert!(JobStatus::Completed.is_terminal());
		assert!(JobStatus::Failed.is_terminal());
		assert!(!JobStatus::Failed.is_running());
	}

	#[test]
	fn test_new_job_is_pending() {
		let job = TestJob::new("audio.wav");
		assert_eq!(job.status, JobStatus::Pending);
		assert_eq!(job.progress, 0.0);
		assert!(job.started_at.is_none());
		assert!(job.completed_at.is_none());
		assert!(job.error.is_none());
		assert!(job.result.is_none());
	}

	#[test]
	fn test_job_ids_are_unique() {
		assert_ne!(JobId::new(), JobId::new());
	}

	#[test]
	fn test_job_id_round_trips_through_string() {
		let id = JobId::new();
		let parsed: JobId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
		assert!("not-a-uuid".parse::<JobId>().is_err());
	}

	#[test]
	fn test_started_at_set_once() {
		let mut job = TestJob::new("audio.wav");
		assert!(job.apply(JobUpdate::status(JobStatus::Processing)));
		let started = job.started_at;
		assert!(started.is_some());

		assert!(job.apply(JobUpdate::status(JobStatus::Aligning)));
		assert_eq!(job.started_at, started);
		assert!(job.completed_at.is_none());
	}

	#[test]
	fn test_terminal_job_is_frozen() {
		let mut job = TestJob::new("audio.wav");
		job.apply(JobUpdate::status(JobStatus::Processing));
		assert!(job.apply(JobUpdate::failed("boom")));
		let completed = job.completed_at;

		assert!(!job.apply(JobUpdate::status(JobStatus::Transcribing).with_progress(50.0)));
		assert_eq!(job.status, JobStatus::Failed);
		assert_eq!(job.error.as_deref(), Some("boom"));
		assert_eq!(job.completed_at, completed);
		assert_eq!(job.progress, 0.0);
	}

	#[test]
	fn test_started_before_completed() {
		let mut job = TestJob::new("audio.wav");
		job.apply(JobUpdate::status(JobStatus::Processing));
		job.apply(JobUpdate::status(JobStatus::Completed).with_progress(100.0));
		assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
	}

	#[test]
	fn test_error_only_kept_on_failure() {
		let mut job = TestJob::new("audio.wav");
		job.apply(JobUpdate {
			status: Some(JobStatus::Processing),
			error: Some("ignored".to_string()),
			..JobUpdate::default()
		});
		assert!(job.error.is_none());
	}

	#[test]
	fn test_progress_is_clamped_and_nan_ignored() {
		let mut job = TestJob::new("audio.wav");
		job.apply(JobUpdate::default().with_progress(150.0));
		assert_eq!(job.progress, 100.0);
		job.apply(JobUpdate::default().with_progress(-3.0));
		assert_eq!(job.progress, 0.0);
		job.apply(JobUpdate::default().with_progress(42.0));
		job.apply(JobUpdate::default().with_progress(f64::NAN));
		assert_eq!(job.progress, 42.0);
	}

	#[test]
	fn test_progress_follows_delivery_order() {
		let mut job = TestJob::new("audio.wav");
		job.apply(JobUpdate::default().with_progress(70.0));
		job.apply(JobUpdate::default().with_progress(30.0));
		assert_eq!(job.progress, 30.0);
	}

	#[test]
	fn test_job_serialization_hides_input() {
		let job = TestJob::new("secret/path.wav");
		let json = serde_json::to_value(&job).unwrap();
		assert_eq!(json["status"], "pending");
		assert_eq!(json["message"], "Job queued");
		assert!(json.get("input").is_none());
		assert!(json["result"].is_null());
		assert_eq!(json["id"], job.id.to_string());
	}

	#[test]
	fn test_status_display_matches_serde() {
		for status in [JobStatus::Pending, JobStatus::Diarizing, JobStatus::Completed] {
			let json = serde_json::to_string(&status).unwrap();
			assert_eq!(json, format!("\"{status}\""));
		}
	}
}
