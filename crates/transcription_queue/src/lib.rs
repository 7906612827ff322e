//! In-process job queue for long-running transcription jobs.
//!
//! Jobs are created pending, admitted through a bounded semaphore, run by an
//! opaque [`Pipeline`], and observed by polling [`JobQueue::get_job`].

pub mod admission;
pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod store;
pub mod sweeper;

pub use admission::{AdmissionController, AdmissionPermit};
pub use config::QueueConfig;
pub use error::QueueError;
pub use job::{Job, JobId, JobStatus, JobUpdate, QueueStats};
pub use models::{TranscriptSegment, TranscriptionOptions, TranscriptionRequest, TranscriptionResult, WordSegment};
pub use pipeline::{Pipeline, TimeoutPipeline};
pub use progress::{stage_status, ProgressEvent, ProgressReporter};
pub use scheduler::{JobQueue, JobSnapshot};
pub use store::JobStore;
pub use sweeper::Sweeper;
