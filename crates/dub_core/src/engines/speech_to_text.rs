//! Asynchronous speech-to-text job contract.

use serde::{Deserialize, Serialize};

use super::EngineResult;
use crate::models::ObjectRef;

/// Everything the engine needs to start a transcription job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub job_name: String,
    pub media: ObjectRef,
    /// Container format of the media (`mp3`, `wav`, `flac`).
    pub media_format: String,
    pub language_code: String,
    /// Where the engine must write its transcript envelope.
    pub output: ObjectRef,
}

/// Engine-side lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineJobState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Snapshot returned by a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionJob {
    pub state: EngineJobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

pub trait SpeechToTextEngine: Send + Sync {
    /// Start a job and return its engine id.
    fn submit(&self, request: &TranscriptionRequest) -> EngineResult<String>;

    fn poll(&self, job_id: &str) -> EngineResult<TranscriptionJob>;
}
