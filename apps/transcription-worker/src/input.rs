use anyhow::{bail, Context, Result};
use std::path::Path;

pub const SUPPORTED_FORMATS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg", "webm", "mp4", "mpeg", "mpga", "oga", "opus"];

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Reject files the pipeline should never see. Runs before a job is created.
pub fn validate_audio_file(path: &Path, max_size_mb: u64) -> Result<()> {
	let ext = path
		.extension()
		.and_then(|ext| ext.to_str())
		.map(str::to_ascii_lowercase)
		.unwrap_or_default();

	if !SUPPORTED_FORMATS.contains(&ext.as_str()) {
		bail!("Unsupported file format '.{ext}'. Supported formats: {}", SUPPORTED_FORMATS.join(", "));
	}

	let metadata = std::fs::metadata(path).with_context(|| format!("Cannot read {}", path.display()))?;
	if !metadata.is_file() {
		bail!("{} is not a regular file", path.display());
	}

	let max_size = max_size_mb.saturating_mul(BYTES_PER_MB);
	if metadata.len() > max_size {
		bail!("File too large. Maximum size is {max_size_mb}MB");
	}

	Ok(())
}
