use crate::error::QueueError;
use crate::progress::ProgressReporter;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

/// The long-running job body the queue wraps.
///
/// The queue treats implementations as opaque: it hands over the job input
/// and a progress reporter, and records whatever comes back. Any `Err` (or
/// panic) marks the job failed with the error's description.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
	type Input: Clone + Send + Sync + 'static;
	type Output: Clone + Send + Sync + 'static;

	async fn run(&self, input: Self::Input, progress: ProgressReporter) -> Result<Self::Output>;

	/// Called after a job is deleted or swept, e.g. to remove an uploaded
	/// file. Errors are logged and otherwise ignored.
	fn release_input(&self, _input: &Self::Input) -> Result<()> {
		Ok(())
	}
}

/// Fails a run that outlives `timeout`. The inner run is dropped, not
/// awaited to completion.
pub struct TimeoutPipeline<P> {
	inner: P,
	timeout: Duration,
}

impl<P: Pipeline> TimeoutPipeline<P> {
	pub const fn new(inner: P, timeout: Duration) -> Self {
		Self { inner, timeout }
	}

	pub const fn inner(&self) -> &P {
		&self.inner
	}
}

#[async_trait]
impl<P: Pipeline> Pipeline for TimeoutPipeline<P> {
	type Input = P::Input;
	type Output = P::Output;

	async fn run(&self, input: Self::Input, progress: ProgressReporter) -> Result<Self::Output> {
		tokio::select! {
			() = sleep(self.timeout) => Err(QueueError::Timeout(self.timeout).into()),
			result = self.inner.run(input, progress) => result,
		}
	}

	fn release_input(&self, input: &Self::Input) -> Result<()> {
		self.inner.release_input(input)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Sleepy {
		delay: Duration,
		released: AtomicUsize,
	}

	#[async_trait]
	impl Pipeline for Sleepy {
		type Input = u32;
		type Output = u32;

		async fn run(&self, input: u32, progress: ProgressReporter) -> Result<u32> {
			progress.report("transcribing", 10.0);
			sleep(self.delay).await;
			Ok(input * 2)
		}

		fn release_input(&self, _input: &u32) -> Result<()> {
			self.released.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	}

	fn sleepy(delay: Duration) -> Sleepy {
		Sleepy {
			delay,
			released: AtomicUsize::new(0),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_fast_run_passes_through() {
		let pipeline = TimeoutPipeline::new(sleepy(Duration::from_secs(1)), Duration::from_secs(10));
		let output = pipeline.run(21, ProgressReporter::disconnected()).await.unwrap();
		assert_eq!(output, 42);
	}

	#[tokio::test(start_paused = true)]
	async fn test_slow_run_times_out() {
		let pipeline = TimeoutPipeline::new(sleepy(Duration::from_secs(60)), Duration::from_secs(5));
		let err = pipeline.run(1, ProgressReporter::disconnected()).await.unwrap_err();
		assert!(matches!(err.downcast_ref::<QueueError>(), Some(QueueError::Timeout(_))));
		assert_eq!(err.to_string(), "Pipeline timed out after 5s");
	}

	#[test]
	fn test_release_input_is_forwarded() {
		let pipeline = TimeoutPipeline::new(sleepy(Duration::ZERO), Duration::from_secs(1));
		pipeline.release_input(&7).unwrap();
		assert_eq!(pipeline.inner().released.load(Ordering::SeqCst), 1);
	}
}
