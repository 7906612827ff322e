use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use transcription_queue::{Pipeline, ProgressReporter, TranscriptionRequest, TranscriptionResult};

/// Stand-in for the model pipeline: walks through the real stage names with
/// a fixed delay per stage and returns an empty transcript.
///
/// Uploaded files belong to the caller here, so `release_input` keeps the
/// default no-op.
pub struct SimulatedTranscriber {
	stage_delay: Duration,
}

impl SimulatedTranscriber {
	pub const fn new(stage_delay: Duration) -> Self {
		Self { stage_delay }
	}

	async fn stage(&self, progress: &ProgressReporter, name: &str, percent: f64) {
		progress.report(name, percent);
		sleep(self.stage_delay).await;
	}
}

#[async_trait]
impl Pipeline for SimulatedTranscriber {
	type Input = TranscriptionRequest;
	type Output = TranscriptionResult;

	async fn run(&self, request: TranscriptionRequest, progress: ProgressReporter) -> Result<TranscriptionResult> {
		self.stage(&progress, "loading_audio", 5.0).await;
		let metadata = tokio::fs::metadata(&request.audio_path)
			.await
			.with_context(|| format!("Failed to load audio {}", request.audio_path.display()))?;
		if metadata.len() == 0 {
			bail!("Audio file {} is empty", request.audio_path.display());
		}
		debug!(path = %request.audio_path.display(), bytes = metadata.len(), "Audio loaded");

		self.stage(&progress, "transcribing", 20.0).await;
		self.stage(&progress, "aligning", 60.0).await;
		if request.options.enable_diarization {
			self.stage(&progress, "diarizing", 80.0).await;
		}
		progress.report("completed", 100.0);

		Ok(TranscriptionResult {
			language: request.options.language.unwrap_or_else(|| "en".to_string()),
			segments: Vec::new(),
			word_segments: None,
		})
	}
}
