use crate::job::{Job, JobId, JobStatus, JobUpdate, QueueStats};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

struct Inner<I, R> {
	jobs: HashMap<JobId, Job<I, R>>,
	results: HashMap<JobId, R>,
}

/// Thread-safe job registry.
///
/// Records and results live behind a single mutex. The lock is only held
/// for the map operation itself, never across an `.await`.
pub struct JobStore<I, R> {
	inner: Mutex<Inner<I, R>>,
}

impl<I: Clone, R: Clone> JobStore<I, R> {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(Inner {
				jobs: HashMap::new(),
				results: HashMap::new(),
			}),
		}
	}

	// A panic while holding the lock cannot leave a half-merged record behind,
	// every mutation is a single assignment sequence on one entry.
	fn lock(&self) -> MutexGuard<'_, Inner<I, R>> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn create(&self, input: I) -> JobId {
		let job = Job::new(input);
		let id = job.id;
		self.lock().jobs.insert(id, job);
		id
	}

	/// Snapshot of a job, joined with its result once the job completed.
	pub fn get(&self, id: &JobId) -> Option<Job<I, R>> {
		let inner = self.lock();
		let mut job = inner.jobs.get(id)?.clone();
		if job.status == JobStatus::Completed {
			job.result = inner.results.get(id).cloned();
		}
		Some(job)
	}

	pub fn input(&self, id: &JobId) -> Option<I> {
		self.lock().jobs.get(id).map(|job| job.input.clone())
	}

	pub fn contains(&self, id: &JobId) -> bool {
		self.lock().jobs.contains_key(id)
	}

	/// Merge `update` into the job. Returns `false` when the job is unknown
	/// or already terminal.
	///
	/// Completion is refused here: a completed job always carries a result,
	/// so [`JobStore::complete`] is the only way into that state.
	pub fn update(&self, id: &JobId, update: JobUpdate) -> bool {
		if update.status == Some(JobStatus::Completed) {
			debug!(job_id = %id, "Refusing completion without a result");
			return false;
		}

		let mut inner = self.lock();
		match inner.jobs.get_mut(id) {
			Some(job) => job.apply(update),
			None => {
				debug!(job_id = %id, "Ignoring update for unknown job");
				false
			}
		}
	}

	/// Store a result for a known job. The result only becomes visible once
	/// the job is marked completed.
	pub fn set_result(&self, id: &JobId, result: R) -> bool {
		let mut inner = self.lock();
		if !inner.jobs.contains_key(id) {
			return false;
		}
		inner.results.insert(*id, result);
		true
	}

	/// Attach the result and mark the job completed in one critical section.
	pub fn complete(&self, id: &JobId, result: R, message: impl Into<String>) -> bool {
		let mut inner = self.lock();
		let Some(job) = inner.jobs.get_mut(id) else {
			return false;
		};
		if !job.apply(JobUpdate::status(JobStatus::Completed).with_progress(100.0).with_message(message)) {
			return false;
		}
		inner.results.insert(*id, result);
		true
	}

	/// Remove a job and its result. Returns the removed record, if any.
	pub fn delete(&self, id: &JobId) -> Option<Job<I, R>> {
		let mut inner = self.lock();
		let result = inner.results.remove(id);
		inner.jobs.remove(id).map(|mut job| {
			job.result = result;
			job
		})
	}

	/// Remove every terminal job created at least `max_age` ago.
	pub fn remove_expired(&self, max_age: Duration) -> Vec<Job<I, R>> {
		let Some(cutoff) = chrono::Duration::from_std(max_age).ok().and_then(|age| Utc::now().checked_sub_signed(age)) else {
			return Vec::new();
		};

		let mut inner = self.lock();
		let expired: Vec<JobId> = inner
			.jobs
			.values()
			.filter(|job| job.is_terminal() && job.created_at <= cutoff)
			.map(|job| job.id)
			.collect();

		expired
			.iter()
			.filter_map(|id| {
				inner.results.remove(id);
				inner.jobs.remove(id)
			})
			.collect()
	}

	/// All jobs, oldest first.
	pub fn list(&self) -> Vec<Job<I, R>> {
		let inner = self.lock();
		let mut jobs: Vec<Job<I, R>> = inner
			.jobs
			.values()
			.map(|job| {
				let mut job = job.clone();
				if job.status == JobStatus::Completed {
					job.result = inner.results.get(&job.id).cloned();
				}
				job
			})
			.collect();
		drop(inner);
		jobs.sort_by_key(|job| job.created_at);
		jobs
	}

	pub fn stats(&self) -> QueueStats {
		let inner = self.lock();
		let mut stats = QueueStats {
			total: inner.jobs.len(),
			..QueueStats::default()
		};

		for job in inner.jobs.values() {
			match job.status {
				JobStatus::Pending => stats.pending += 1,
				JobStatus::Completed => stats.completed += 1,
				JobStatus::Failed => stats.failed += 1,
				status if status.is_running() => stats.running += 1,
				_ => {}
			}
		}

		stats
	}

	pub fn len(&self) -> usize {
		self.lock().jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().jobs.is_empty()
	}
}

impl<I: Clone, R: Clone> Default for JobStore<I, R> {
	fn default() -> Self {
		Self::new()
	}
}
