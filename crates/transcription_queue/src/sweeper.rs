use crate::config::QueueConfig;
use crate::pipeline::Pipeline;
use crate::scheduler::JobQueue;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Periodically evicts finished jobs older than `max_age`.
pub struct Sweeper<P: Pipeline> {
	queue: JobQueue<P>,
	interval: Duration,
	max_age: Duration,
}

impl<P: Pipeline> Sweeper<P> {
	pub const fn new(queue: JobQueue<P>, interval: Duration, max_age: Duration) -> Self {
		Self { queue, interval, max_age }
	}

	pub fn from_config(queue: JobQueue<P>, config: &QueueConfig) -> Self {
		Self::new(queue, config.cleanup_interval, config.cleanup_after)
	}

	pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
		tokio::spawn(self.run(token))
	}

	pub async fn run(self, token: CancellationToken) {
		info!(interval_secs = self.interval.as_secs(), max_age_secs = self.max_age.as_secs(), "Starting cleanup sweeper");

		let mut ticker = interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		// the first tick completes immediately
		ticker.tick().await;

		loop {
			tokio::select! {
				() = token.cancelled() => {
					info!("Cleanup sweeper stopped");
					break;
				}
				_ = ticker.tick() => {
					self.queue.sweep(self.max_age);
				}
			}
		}
	}
}
