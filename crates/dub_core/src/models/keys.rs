//! Deterministic object-store keys for every pipeline payload.
//!
//! Layout:
//! - `transcripts/{stem}_transcript_{lang}-{ts}.txt`
//! - `translations/{stem}_translation_{lang}-{ts}.txt`
//! - `audio_outputs/{stem}_{lang}-{ts}.{ext}`
//!
//! `{ts}` is `YYYYMMDD_HHMMSS.mmm` in UTC and `{stem}` is the original
//! filename up to its first `.`. With [`KeyScheme::RunScoped`] the first
//! eight hex digits of the run id follow the timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StageKind;

/// How output keys are disambiguated between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    /// Timestamp only.
    #[default]
    Legacy,
    /// Timestamp plus a short run id suffix.
    RunScoped,
}

/// Filename up to its first `.`.
pub fn filename_stem(filename: &str) -> &str {
    filename.split('.').next().unwrap_or(filename)
}

/// Millisecond-precision UTC timestamp used in keys.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S%.3f").to_string()
}

/// Name of a transcription job: `{stem}-{epoch_seconds}`.
pub fn job_name(stem: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", stem, at.timestamp())
}

/// File extension for a synthesis output format.
pub fn audio_extension(format: &str) -> &str {
    match format {
        "ogg_vorbis" => "ogg",
        "pcm" => "pcm",
        "mp3" => "mp3",
        other => other,
    }
}

/// Builds keys for one filename at one instant.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    stem: String,
    timestamp: String,
    run_suffix: Option<String>,
}

impl KeyBuilder {
    pub fn new(original_filename: &str, at: DateTime<Utc>) -> Self {
        Self {
            stem: filename_stem(original_filename).to_string(),
            timestamp: format_timestamp(at),
            run_suffix: None,
        }
    }

    /// Apply a key scheme for the given run.
    pub fn with_scheme(mut self, scheme: KeyScheme, run_id: Uuid) -> Self {
        self.run_suffix = match scheme {
            KeyScheme::Legacy => None,
            KeyScheme::RunScoped => {
                let simple = run_id.simple().to_string();
                Some(simple[..8].to_string())
            }
        };
        self
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn transcript(&self, language: &str) -> String {
        self.build(StageKind::Transcription, "_transcript", language, "txt")
    }

    pub fn translation(&self, language: &str) -> String {
        self.build(StageKind::Translation, "_translation", language, "txt")
    }

    pub fn audio(&self, language: &str, format: &str) -> String {
        self.build(StageKind::Synthesis, "", language, audio_extension(format))
    }

    fn build(&self, stage: StageKind, infix: &str, language: &str, ext: &str) -> String {
        let mut key = format!(
            "{}/{}{}_{}-{}",
            stage.key_prefix(),
            self.stem,
            infix,
            language,
            self.timestamp
        );
        if let Some(suffix) = &self.run_suffix {
            key.push('-');
            key.push_str(suffix);
        }
        key.push('.');
        key.push_str(ext);
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap() + Duration::milliseconds(42)
    }

    #[test]
    fn legacy_layout_is_exact() {
        let keys = KeyBuilder::new("talk.final.mp3", at());
        assert_eq!(
            keys.transcript("en-US"),
            "transcripts/talk_transcript_en-US-20240501_123005.042.txt"
        );
        assert_eq!(
            keys.translation("es"),
            "translations/talk_translation_es-20240501_123005.042.txt"
        );
        assert_eq!(
            keys.audio("fr", "mp3"),
            "audio_outputs/talk_fr-20240501_123005.042.mp3"
        );
    }

    #[test]
    fn run_scoped_appends_short_run_id() {
        let run_id = Uuid::parse_str("0123456789abcdef0123456789abcdef").unwrap();
        let keys = KeyBuilder::new("talk.mp3", at()).with_scheme(KeyScheme::RunScoped, run_id);
        assert_eq!(
            keys.audio("de", "ogg_vorbis"),
            "audio_outputs/talk_de-20240501_123005.042-01234567.ogg"
        );
    }

    #[test]
    fn distinct_instants_never_collide() {
        let a = KeyBuilder::new("talk.mp3", at());
        let b = KeyBuilder::new("talk.mp3", at() + Duration::milliseconds(1));
        assert_ne!(a.translation("es"), b.translation("es"));
        assert_ne!(a.transcript("en-US"), b.transcript("en-US"));
    }

    #[test]
    fn stem_and_job_name() {
        assert_eq!(filename_stem("noext"), "noext");
        assert_eq!(filename_stem("a.b.c"), "a");
        assert_eq!(job_name("talk", at()), format!("talk-{}", at().timestamp()));
    }
}
