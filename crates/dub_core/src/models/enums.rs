//! Core enums used throughout the pipeline.

use serde::{Deserialize, Serialize};

/// One phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Speech-to-text of the uploaded recording.
    Transcription,
    /// Machine translation into each target language.
    Translation,
    /// Text-to-speech of each translation.
    Synthesis,
}

impl StageKind {
    /// Object-store prefix the stage writes its payloads under.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            StageKind::Transcription => "transcripts",
            StageKind::Translation => "translations",
            StageKind::Synthesis => "audio_outputs",
        }
    }

    /// Whether the stage fans out into one unit per target language.
    pub fn is_fan_out(&self) -> bool {
        !matches!(self, StageKind::Transcription)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Transcription => write!(f, "Transcription"),
            StageKind::Translation => write!(f, "Translation"),
            StageKind::Synthesis => write!(f, "Synthesis"),
        }
    }
}

/// Stage-level status reported to the scheduler.
///
/// `Completed`, `PartiallyFailed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    /// Work is still pending.
    InProgress,
    /// Every unit produced its output.
    Completed,
    /// Some units produced output; the rest failed or were given up on.
    PartiallyFailed,
    /// Nothing usable was produced.
    Failed,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::InProgress)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::InProgress => write!(f, "IN_PROGRESS"),
            StageStatus::Completed => write!(f, "COMPLETED"),
            StageStatus::PartiallyFailed => write!(f, "PARTIALLY_FAILED"),
            StageStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_progress_is_non_terminal() {
        assert!(!StageStatus::InProgress.is_terminal());
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::PartiallyFailed.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
    }

    #[test]
    fn stage_status_serializes_screaming() {
        let json = serde_json::to_string(&StageStatus::PartiallyFailed).unwrap();
        assert_eq!(json, "\"PARTIALLY_FAILED\"");
    }

    #[test]
    fn fan_out_stages() {
        assert!(!StageKind::Transcription.is_fan_out());
        assert!(StageKind::Translation.is_fan_out());
        assert_eq!(StageKind::Synthesis.key_prefix(), "audio_outputs");
    }
}
