use clap::Parser;
use std::path::PathBuf;
use transcription_queue::QueueConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "transcription-worker")]
#[command(about = "Runs audio transcription jobs through a bounded job queue", long_about = None)]
pub struct Config {
	/// Audio files to transcribe
	#[arg(required = true)]
	pub audio_files: Vec<PathBuf>,

	/// Language code (auto-detected when omitted)
	#[arg(long, env = "TRANSCRIBE_LANGUAGE")]
	pub language: Option<String>,

	/// Minimum number of speakers
	#[arg(long)]
	pub min_speakers: Option<u32>,

	/// Maximum number of speakers
	#[arg(long)]
	pub max_speakers: Option<u32>,

	/// Skip speaker diarization
	#[arg(long)]
	pub no_diarization: bool,

	/// Maximum accepted file size in megabytes
	#[arg(long, env = "MAX_FILE_SIZE_MB", default_value = "500")]
	pub max_file_size_mb: u64,

	/// Simulated time spent in each pipeline stage, in milliseconds
	#[arg(long, env = "STAGE_DELAY_MS", default_value = "250")]
	pub stage_delay_ms: u64,

	/// Interval between progress polls, in milliseconds
	#[arg(long, env = "POLL_INTERVAL_MS", default_value = "500")]
	pub poll_interval_ms: u64,

	/// Emit logs as JSON
	#[arg(long, env = "LOG_JSON")]
	pub log_json: bool,

	#[command(flatten)]
	pub queue: QueueConfig,
}

impl Config {
	/// Validate configuration values
	pub fn validate(&self) -> Result<(), String> {
		self.queue.validate().map_err(|e| e.to_string())?;

		if matches!(self.min_speakers, Some(0)) || matches!(self.max_speakers, Some(0)) {
			return Err("speaker counts must be at least 1".to_string());
		}

		if let (Some(min), Some(max)) = (self.min_speakers, self.max_speakers) {
			if min > max {
				return Err(format!("min_speakers ({min}) cannot exceed max_speakers ({max})"));
			}
		}

		if self.max_file_size_mb == 0 {
			return Err("max_file_size_mb must be greater than 0".to_string());
		}

		if self.poll_interval_ms == 0 {
			return Err("poll_interval_ms must be greater than 0".to_string());
		}

		Ok(())
	}
}
