mod config;
mod input;
mod observability;
mod pipeline;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use prometheus::Registry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use transcription_queue::{JobId, JobQueue, JobStatus, Sweeper, TimeoutPipeline, TranscriptionOptions, TranscriptionRequest};

use config::Config;
use pipeline::SimulatedTranscriber;

type WorkerQueue = JobQueue<TimeoutPipeline<SimulatedTranscriber>>;

#[tokio::main]
async fn main() -> Result<()> {
	// Load environment variables
	dotenvy::dotenv().ok();

	let config = Config::parse();
	config.validate().map_err(|e| anyhow!(e))?;

	observability::init_tracing(config.log_json);

	info!(
		max_concurrent_tasks = config.queue.max_concurrent_tasks,
		task_timeout_secs = config.queue.task_timeout.as_secs(),
		files = config.audio_files.len(),
		"🎯 Starting transcription worker"
	);

	let registry = Registry::new();
	let pipeline = TimeoutPipeline::new(SimulatedTranscriber::new(Duration::from_millis(config.stage_delay_ms)), config.queue.task_timeout);
	let queue = JobQueue::new(pipeline, &config.queue, &registry)?;

	let cancellation_token = CancellationToken::new();
	let sweeper = Sweeper::from_config(queue.clone(), &config.queue).spawn(cancellation_token.child_token());

	let jobs = enqueue_files(&queue, &config);
	if jobs.is_empty() {
		cancellation_token.cancel();
		bail!("No valid audio files to transcribe");
	}

	tokio::select! {
		() = watch_jobs(&queue, &jobs, Duration::from_millis(config.poll_interval_ms)) => {
			info!("✅ All jobs finished");
		}
		() = wait_for_shutdown_signal() => {
			warn!("🛑 Shutdown signal received, dropping queued jobs and draining running ones");
			drop_pending(&queue, &jobs);
		}
	}

	cancellation_token.cancel();
	queue.shutdown().await;
	sweeper.await?;

	print_results(&queue, &jobs)?;
	info!(stats = ?queue.stats(), "📊 Final queue stats");
	observability::log_metrics(&registry)?;

	Ok(())
}

fn enqueue_files(queue: &WorkerQueue, config: &Config) -> Vec<(JobId, PathBuf)> {
	let options = TranscriptionOptions {
		language: config.language.clone(),
		min_speakers: config.min_speakers,
		max_speakers: config.max_speakers,
		enable_diarization: !config.no_diarization,
		return_char_alignments: false,
	};

	let mut jobs = Vec::with_capacity(config.audio_files.len());
	for path in &config.audio_files {
		if let Err(e) = input::validate_audio_file(path, config.max_file_size_mb) {
			warn!(path = %path.display(), error = %e, "⚠️ Skipping file");
			continue;
		}

		let id = queue.enqueue(TranscriptionRequest::new(path.clone(), options.clone()));
		info!(job_id = %id, path = %path.display(), "📥 Transcription job queued");
		jobs.push((id, path.clone()));
	}
	jobs
}

/// Poll until every job is terminal, logging each status or progress change
async fn watch_jobs(queue: &WorkerQueue, jobs: &[(JobId, PathBuf)], poll_interval: Duration) {
	let mut last_seen: HashMap<JobId, (JobStatus, u64)> = HashMap::new();

	loop {
		let mut unfinished = 0;
		for (id, path) in jobs {
			let Some(job) = queue.get_job(id) else {
				continue;
			};
			if !job.is_terminal() {
				unfinished += 1;
			}

			// whole percents are enough to detect a change worth logging
			let snapshot = (job.status, job.progress.round() as u64);
			if last_seen.insert(*id, snapshot) != Some(snapshot) {
				info!(job_id = %id, path = %path.display(), status = %job.status, progress = job.progress, message = %job.message, "⏳ Job update");
			}
		}

		if unfinished == 0 {
			return;
		}
		tokio::time::sleep(poll_interval).await;
	}
}

fn drop_pending(queue: &WorkerQueue, jobs: &[(JobId, PathBuf)]) {
	for (id, _) in jobs {
		let pending = queue.get_job(id).is_some_and(|job| job.status == JobStatus::Pending);
		if pending {
			if let Err(e) = queue.delete_job(id) {
				warn!(job_id = %id, error = %e, "Failed to drop queued job");
			}
		}
	}
}

fn print_results(queue: &WorkerQueue, jobs: &[(JobId, PathBuf)]) -> Result<()> {
	for (id, path) in jobs {
		match queue.get_job(id) {
			Some(job) => {
				if let Some(error) = &job.error {
					error!(job_id = %id, path = %path.display(), error = %error, "❌ Transcription failed");
				}
				println!("{}", serde_json::to_string_pretty(&job)?);
			}
			None => warn!(job_id = %id, path = %path.display(), "Job was dropped before it ran"),
		}
	}
	Ok(())
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			error!(error = %e, "Failed to install Ctrl+C handler");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sigterm) => {
				sigterm.recv().await;
			}
			Err(e) => {
				error!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}
}
