use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for a transcription job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionOptions {
	/// Language code (e.g. "en"). Auto-detected when absent.
	pub language: Option<String>,
	pub min_speakers: Option<u32>,
	pub max_speakers: Option<u32>,
	pub enable_diarization: bool,
	pub return_char_alignments: bool,
}

impl Default for TranscriptionOptions {
	fn default() -> Self {
		Self {
			language: None,
			min_speakers: None,
			max_speakers: None,
			enable_diarization: true,
			return_char_alignments: false,
		}
	}
}

/// Input payload of a transcription job: an audio file already on disk and
/// how to transcribe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
	pub audio_path: PathBuf,
	#[serde(default)]
	pub options: TranscriptionOptions,
}

impl TranscriptionRequest {
	pub fn new(audio_path: impl Into<PathBuf>, options: TranscriptionOptions) -> Self {
		Self {
			audio_path: audio_path.into(),
			options,
		}
	}
}

/// Word-level timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordSegment {
	pub word: String,
	pub start: f64,
	pub end: f64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub score: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub speaker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
	pub start: f64,
	pub end: f64,
	pub text: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub speaker: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub words: Option<Vec<WordSegment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
	pub language: String,
	pub segments: Vec<TranscriptSegment>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub word_segments: Option<Vec<WordSegment>>,
}
