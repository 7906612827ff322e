use crate::admission::{AdmissionController, AdmissionPermit};
use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::job::{Job, JobId, JobStatus, JobUpdate, QueueStats};
use crate::metrics::QueueMetrics;
use crate::pipeline::Pipeline;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::JobStore;
use futures::FutureExt;
use prometheus::{IntGauge, Registry};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

pub type JobSnapshot<P> = Job<<P as Pipeline>::Input, <P as Pipeline>::Output>;

/// Handle to the job queue. Cheap to clone; every clone drives the same
/// store, admission controller and pipeline.
pub struct JobQueue<P: Pipeline> {
	shared: Arc<Shared<P>>,
}

struct Shared<P: Pipeline> {
	store: JobStore<P::Input, P::Output>,
	admission: AdmissionController,
	pipeline: Arc<P>,
	metrics: QueueMetrics,
	tracker: TaskTracker,
	dispatch: Mutex<Dispatch>,
	// submitted but not yet handed to a job task
	queued: AtomicUsize,
}

/// A submitted job's place in line.
struct Ticket {
	id: JobId,
	queued_at: Instant,
}

struct Dispatch {
	tickets: Option<mpsc::UnboundedSender<Ticket>>,
	// taken by the first `submit`, which starts the dispatcher
	receiver: Option<mpsc::UnboundedReceiver<Ticket>>,
	handle: Option<JoinHandle<()>>,
}

impl<P: Pipeline> Clone for JobQueue<P> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<P: Pipeline> JobQueue<P> {
	pub fn new(pipeline: P, config: &QueueConfig, registry: &Registry) -> Result<Self, QueueError> {
		config.validate()?;

		let (tickets, receiver) = mpsc::unbounded_channel();
		Ok(Self {
			shared: Arc::new(Shared {
				store: JobStore::new(),
				admission: AdmissionController::new(config.max_concurrent_tasks),
				pipeline: Arc::new(pipeline),
				metrics: QueueMetrics::new(registry)?,
				tracker: TaskTracker::new(),
				dispatch: Mutex::new(Dispatch {
					tickets: Some(tickets),
					receiver: Some(receiver),
					handle: None,
				}),
				queued: AtomicUsize::new(0),
			}),
		})
	}

	/// Register a new pending job. Does not start it.
	pub fn create_job(&self, input: P::Input) -> JobId {
		let id = self.shared.store.create(input);
		self.shared.metrics.jobs_created.inc();
		info!(job_id = %id, "Created job");
		id
	}

	/// Schedule a created job in the background and return immediately.
	///
	/// The job's place in line is fixed before this returns: waiting jobs are
	/// admitted in the order `submit` was called, whatever runtime flavor
	/// drives them. Must be called from within a tokio runtime, once per job.
	/// Unknown ids, and any id after [`JobQueue::shutdown`], are ignored and
	/// return `false`.
	pub fn submit(&self, id: JobId) -> bool {
		if !self.shared.store.contains(&id) {
			warn!(job_id = %id, "Cannot submit unknown job");
			return false;
		}

		let mut dispatch = self.shared.lock_dispatch();
		let Some(tickets) = dispatch.tickets.clone() else {
			warn!(job_id = %id, "Queue is shut down, job stays pending");
			return false;
		};

		if let Some(receiver) = dispatch.receiver.take() {
			let shared = Arc::downgrade(&self.shared);
			let admission = self.shared.admission.clone();
			dispatch.handle = Some(tokio::spawn(run_dispatcher(shared, admission, receiver)));
		}

		self.shared.queued.fetch_add(1, Ordering::SeqCst);
		let ticket = Ticket { id, queued_at: Instant::now() };
		if tickets.send(ticket).is_err() {
			self.shared.queued.fetch_sub(1, Ordering::SeqCst);
			error!(job_id = %id, "Job dispatcher is gone");
			return false;
		}
		debug!(job_id = %id, "Submitted job");
		true
	}

	/// `create_job` followed by `submit`.
	pub fn enqueue(&self, input: P::Input) -> JobId {
		let id = self.create_job(input);
		self.submit(id);
		id
	}

	pub fn get_job(&self, id: &JobId) -> Option<JobSnapshot<P>> {
		self.shared.store.get(id)
	}

	pub fn list_jobs(&self) -> Vec<JobSnapshot<P>> {
		self.shared.store.list()
	}

	/// Remove a job from view.
	///
	/// A running job keeps executing until its pipeline returns; its late
	/// updates are dropped and it never reappears. A waiting job is skipped
	/// when its turn comes.
	pub fn delete_job(&self, id: &JobId) -> Result<(), QueueError> {
		let job = self.shared.store.delete(id).ok_or(QueueError::NotFound(*id))?;

		if job.is_terminal() {
			info!(job_id = %id, "Deleted job");
		} else {
			info!(job_id = %id, status = %job.status, "Deleted unfinished job, execution continues detached");
		}

		self.shared.release_input(&job);
		Ok(())
	}

	/// Remove finished jobs created at least `max_age` ago. Returns how many
	/// were removed.
	pub fn sweep(&self, max_age: Duration) -> usize {
		let removed = self.shared.store.remove_expired(max_age);
		for job in &removed {
			self.shared.release_input(job);
		}

		let count = removed.len();
		self.shared.metrics.jobs_swept.inc_by(count as u64);
		info!(count, max_age_secs = max_age.as_secs(), "Cleaned up old jobs");
		count
	}

	pub fn stats(&self) -> QueueStats {
		self.shared.store.stats()
	}

	pub fn admission(&self) -> &AdmissionController {
		&self.shared.admission
	}

	pub fn pipeline(&self) -> &P {
		&self.shared.pipeline
	}

	/// Submitted jobs that have not finished yet, waiting or running.
	pub fn in_flight(&self) -> usize {
		// a ticket is counted until its job task exists, so the sum never dips to zero in between
		self.shared.queued.load(Ordering::SeqCst) + self.shared.tracker.len()
	}

	/// Stop accepting submissions and wait for every submitted job to reach
	/// a terminal state.
	pub async fn shutdown(&self) {
		let dispatcher = {
			let mut dispatch = self.shared.lock_dispatch();
			dispatch.tickets = None;
			dispatch.receiver = None;
			dispatch.handle.take()
		};

		if let Some(handle) = dispatcher {
			if let Err(e) = handle.await {
				error!(error = %e, "Job dispatcher aborted");
			}
		}

		self.shared.tracker.close();
		self.shared.tracker.wait().await;
		info!("Job queue drained");
	}
}

/// Hands tickets out one at a time: a ticket only leaves the line once it
/// holds a slot, so admission follows submission order.
///
/// Holds the queue weakly and stops once every handle is gone or the ticket
/// channel is closed and drained.
async fn run_dispatcher<P: Pipeline>(shared: Weak<Shared<P>>, admission: AdmissionController, mut tickets: mpsc::UnboundedReceiver<Ticket>) {
	debug!(capacity = admission.capacity(), "Starting job dispatcher");

	while let Some(ticket) = tickets.recv().await {
		let acquired = admission.acquire().await;
		let Some(shared) = shared.upgrade() else {
			break;
		};
		shared.admit(ticket, acquired);
	}

	debug!("Job dispatcher stopped");
}

impl<P: Pipeline> Shared<P> {
	fn lock_dispatch(&self) -> MutexGuard<'_, Dispatch> {
		self.dispatch.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn admit(self: &Arc<Self>, ticket: Ticket, acquired: Result<AdmissionPermit, QueueError>) {
		let Ticket { id, queued_at } = ticket;

		match acquired {
			Ok(permit) if self.store.contains(&id) => {
				self.metrics.admission_wait.observe(queued_at.elapsed().as_secs_f64());
				let shared = Arc::clone(self);
				self.tracker.spawn(async move {
					shared.run_job(id, permit).await;
				});
			}
			Ok(permit) => {
				debug!(job_id = %id, "Job deleted while waiting, skipping");
				permit.release();
			}
			Err(e) => {
				error!(job_id = %id, error = %e, "Could not admit job");
				self.fail(&id, e.to_string());
			}
		}

		self.queued.fetch_sub(1, Ordering::SeqCst);
	}

	async fn run_job(self: Arc<Self>, id: JobId, permit: AdmissionPermit) {
		let _running = RunningGuard::new(&self.metrics.jobs_running);
		self.execute(id).await;

		permit.release();
	}

	async fn execute(self: &Arc<Self>, id: JobId) {
		self.store.update(&id, JobUpdate::status(JobStatus::Processing).with_progress(0.0).with_message("Job started"));

		let Some(input) = self.store.input(&id) else {
			warn!(job_id = %id, "Job input not found, job was probably deleted");
			self.fail(&id, "Job input not found");
			return;
		};

		info!(job_id = %id, "Starting job");
		let started = Instant::now();

		// polled by this task, so every report lands before the next one is issued
		let outcome = AssertUnwindSafe(self.pipeline.run(input, self.progress_reporter(id))).catch_unwind().await;

		let elapsed_ms = started.elapsed().as_millis();
		match outcome {
			Ok(Ok(output)) => {
				if self.store.complete(&id, output, "Job completed successfully") {
					self.metrics.jobs_completed.inc();
					info!(job_id = %id, elapsed_ms, "Job completed successfully");
				} else {
					debug!(job_id = %id, "Job removed while running, dropping result");
				}
			}
			Ok(Err(e)) => {
				let description = format!("{e:#}");
				error!(job_id = %id, elapsed_ms, error = %description, "Job failed");
				self.fail(&id, description);
			}
			Err(payload) => {
				let description = describe_panic(payload.as_ref());
				error!(job_id = %id, elapsed_ms, error = %description, "Job pipeline panicked");
				self.fail(&id, description);
			}
		}
	}

	/// Reporter whose reports are applied to the store before `report`
	/// returns.
	fn progress_reporter(self: &Arc<Self>, id: JobId) -> ProgressReporter {
		let shared = Arc::downgrade(self);
		ProgressReporter::new(move |event| {
			if let Some(shared) = shared.upgrade() {
				shared.apply_progress(&id, &event);
			}
		})
	}

	fn apply_progress(&self, id: &JobId, event: &ProgressEvent) {
		debug!(job_id = %id, stage = %event.stage, percent = event.percent, "Job progress");
		self.store.update(id, event.to_update());
	}

	fn fail(&self, id: &JobId, error: impl Into<String>) {
		if self.store.update(id, JobUpdate::failed(error).with_message("Job failed")) {
			self.metrics.jobs_failed.inc();
		}
	}

	fn release_input(&self, job: &Job<P::Input, P::Output>) {
		if let Err(e) = self.pipeline.release_input(&job.input) {
			warn!(job_id = %job.id, error = %e, "Failed to release job input");
		}
	}
}

struct RunningGuard<'a>(&'a IntGauge);

impl<'a> RunningGuard<'a> {
	fn new(gauge: &'a IntGauge) -> Self {
		gauge.inc();
		Self(gauge)
	}
}

impl Drop for RunningGuard<'_> {
	fn drop(&mut self) {
		self.0.dec();
	}
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(ToString::to_string)
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.map_or_else(|| "Pipeline panicked".to_string(), |msg| format!("Pipeline panicked: {msg}"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::Result;
	use async_trait::async_trait;

	struct Echo;

	#[async_trait]
	impl Pipeline for Echo {
		type Input = String;
		type Output = String;

		async fn run(&self, input: String, progress: ProgressReporter) -> Result<String> {
			progress.report("transcribing", 50.0);
			Ok(input.to_uppercase())
		}
	}

	fn queue() -> JobQueue<Echo> {
		JobQueue::new(Echo, &QueueConfig::test(), &Registry::new()).unwrap()
	}

	#[test]
	fn test_new_rejects_invalid_config() {
		let config = QueueConfig {
			max_concurrent_tasks: 0,
			..QueueConfig::test()
		};
		assert!(matches!(JobQueue::new(Echo, &config, &Registry::new()), Err(QueueError::InvalidConfig(_))));
	}

	#[test]
	fn test_create_job_is_pending() {
		let queue = queue();
		let id = queue.create_job("hello".to_string());

		let job = queue.get_job(&id).unwrap();
		assert_eq!(job.status, JobStatus::Pending);
		assert_eq!(job.progress, 0.0);
		assert_eq!(queue.stats().pending, 1);
		assert_eq!(queue.in_flight(), 0);
	}

	#[tokio::test]
	async fn test_submit_unknown_job_is_noop() {
		let queue = queue();
		assert!(!queue.submit(JobId::new()));
		assert_eq!(queue.in_flight(), 0);
	}

	#[test]
	fn test_delete_unknown_job_is_not_found() {
		let queue = queue();
		let id = JobId::new();
		assert!(matches!(queue.delete_job(&id), Err(QueueError::NotFound(missing)) if missing == id));
	}

	#[tokio::test]
	async fn test_enqueue_runs_to_completion() {
		let queue = queue();
		let id = queue.enqueue("hello".to_string());
		queue.shutdown().await;

		let job = queue.get_job(&id).unwrap();
		assert_eq!(job.status, JobStatus::Completed);
		assert_eq!(job.progress, 100.0);
		assert_eq!(job.result.as_deref(), Some("HELLO"));
		assert!(job.started_at.is_some());
		assert!(job.started_at <= job.completed_at);
		assert_eq!(queue.admission().available(), 1);
	}

	#[tokio::test]
	async fn test_shutdown_stops_accepting_jobs() {
		let queue = queue();
		let before = queue.enqueue("before".to_string());
		queue.shutdown().await;

		let after = queue.create_job("after".to_string());
		assert!(!queue.submit(after));
		assert_eq!(queue.get_job(&before).unwrap().status, JobStatus::Completed);
		assert_eq!(queue.get_job(&after).unwrap().status, JobStatus::Pending);
		assert_eq!(queue.in_flight(), 0);
	}

	#[tokio::test]
	async fn test_in_flight_counts_waiting_jobs() {
		let queue = queue();
		queue.enqueue("a".to_string());
		queue.enqueue("b".to_string());
		assert_eq!(queue.in_flight(), 2);

		queue.shutdown().await;
		assert_eq!(queue.in_flight(), 0);
	}

	#[test]
	fn test_describe_panic_payloads() {
		let payload = std::panic::catch_unwind(|| panic!("{}", String::from("model missing"))).unwrap_err();
		assert_eq!(describe_panic(payload.as_ref()), "Pipeline panicked: model missing");

		let payload = std::panic::catch_unwind(|| panic!("weights not loaded")).unwrap_err();
		assert_eq!(describe_panic(payload.as_ref()), "Pipeline panicked: weights not loaded");

		let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
		assert_eq!(describe_panic(payload.as_ref()), "Pipeline panicked");
	}
}
