use crate::error::QueueError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate that bounds how many job bodies run at once.
///
/// Waiters are woken in the order they started waiting.
#[derive(Debug, Clone)]
pub struct AdmissionController {
	semaphore: Arc<Semaphore>,
	capacity: usize,
}

/// An occupied admission slot. The slot is returned when the permit is
/// dropped, including during unwinding.
#[derive(Debug)]
pub struct AdmissionPermit {
	permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
	/// Return the slot now instead of at end of scope.
	pub fn release(self) {
		drop(self.permit);
	}
}

impl AdmissionController {
	/// A zero capacity would park every job forever, so it is raised to one.
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			semaphore: Arc::new(Semaphore::new(capacity)),
			capacity,
		}
	}

	pub async fn acquire(&self) -> Result<AdmissionPermit, QueueError> {
		let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
		Ok(AdmissionPermit { permit })
	}

	pub fn try_acquire(&self) -> Option<AdmissionPermit> {
		Arc::clone(&self.semaphore).try_acquire_owned().ok().map(|permit| AdmissionPermit { permit })
	}

	pub const fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn available(&self) -> usize {
		self.semaphore.available_permits()
	}

	pub fn in_use(&self) -> usize {
		self.capacity.saturating_sub(self.available())
	}
}
