//! Settings struct with TOML-based sections.
//!
//! Each section maps to one TOML table and can be rewritten on its own through
//! [`ConfigManager::update_section`](super::ConfigManager::update_section).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};
use crate::models::{KeyScheme, LanguageCode};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Target language -> voice id.
    #[serde(default)]
    pub voices: VoiceSettings,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub fan_out: FanOutSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Reject combinations the pipeline cannot run with.
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let p = &self.pipeline;
        if p.source_language.trim().is_empty() {
            return Err("pipeline.source_language must not be empty".into());
        }
        if p.translation_source_language.trim().is_empty() {
            return Err("pipeline.translation_source_language must not be empty".into());
        }
        if p.supported_languages.is_empty() {
            return Err("pipeline.supported_languages must not be empty".into());
        }
        if p.target_languages.is_empty() {
            return Err("pipeline.target_languages must not be empty".into());
        }
        if let Some(lang) = p
            .target_languages
            .iter()
            .find(|l| !p.supported_languages.contains(l))
        {
            return Err(format!(
                "default target language '{}' is not in pipeline.supported_languages",
                lang
            ));
        }
        if p.audio_format.trim().is_empty() || p.media_format.trim().is_empty() {
            return Err("pipeline media and audio formats must not be empty".into());
        }
        if self.polling.transcription_checks == 0 || self.polling.aggregate_checks == 0 {
            return Err("polling budgets must be at least 1".into());
        }
        Ok(())
    }
}

/// Languages, formats and key layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Language of the uploaded recordings, as the speech engine names it.
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Same language, as the translation engine names it.
    #[serde(default = "default_translation_source")]
    pub translation_source_language: String,

    /// Used when a trigger does not name its own targets.
    #[serde(default = "default_target_languages")]
    pub target_languages: Vec<LanguageCode>,

    #[serde(default = "default_supported_languages")]
    pub supported_languages: Vec<LanguageCode>,

    /// Fallback media format when the key has no recognised extension.
    #[serde(default = "default_mp3")]
    pub media_format: String,

    #[serde(default = "default_mp3")]
    pub audio_format: String,

    #[serde(default)]
    pub key_scheme: KeyScheme,
}

fn default_source_language() -> String {
    "en-US".to_string()
}

fn default_translation_source() -> String {
    "en".to_string()
}

fn default_target_languages() -> Vec<LanguageCode> {
    vec!["es".into(), "fr".into(), "de".into()]
}

fn default_supported_languages() -> Vec<LanguageCode> {
    ["es", "fr", "de", "it", "pt", "ja"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_mp3() -> String {
    "mp3".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            translation_source_language: default_translation_source(),
            target_languages: default_target_languages(),
            supported_languages: default_supported_languages(),
            media_format: default_mp3(),
            audio_format: default_mp3(),
            key_scheme: KeyScheme::default(),
        }
    }
}

/// Voice used for each target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceSettings(pub BTreeMap<LanguageCode, String>);

impl VoiceSettings {
    pub fn voice_for(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self(
            [("es", "Lucia"), ("fr", "Celine"), ("de", "Marlene")]
                .iter()
                .map(|(l, v)| (l.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Per-call limits in milliseconds. Zero disables the limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,

    #[serde(default = "default_engine_ms")]
    pub transcription_ms: u64,

    #[serde(default = "default_engine_ms")]
    pub translation_ms: u64,

    #[serde(default = "default_engine_ms")]
    pub synthesis_ms: u64,
}

fn default_store_ms() -> u64 {
    10_000
}

fn default_engine_ms() -> u64 {
    30_000
}

impl TimeoutSettings {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_millis(self.transcription_ms)
    }

    pub fn translation(&self) -> Duration {
        Duration::from_millis(self.translation_ms)
    }

    pub fn synthesis(&self) -> Duration {
        Duration::from_millis(self.synthesis_ms)
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            store_ms: default_store_ms(),
            transcription_ms: default_engine_ms(),
            translation_ms: default_engine_ms(),
            synthesis_ms: default_engine_ms(),
        }
    }
}

/// How many status checks a stage gets before it is settled by force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_transcription_checks")]
    pub transcription_checks: u32,

    #[serde(default = "default_aggregate_checks")]
    pub aggregate_checks: u32,
}

fn default_transcription_checks() -> u32 {
    240
}

fn default_aggregate_checks() -> u32 {
    10
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            transcription_checks: default_transcription_checks(),
            aggregate_checks: default_aggregate_checks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutSettings {
    /// Run per-language units on scoped threads instead of one after another.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format.
    #[serde(default = "default_true")]
    pub compact: bool,

    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    /// Number of recent lines kept for error reports.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Folder for per-run log files. Empty disables file output.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl LoggingSettings {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            error_tail: self.error_tail as usize,
            show_timestamps: self.show_timestamps,
        }
    }

    /// Folder for per-run log files, or `None` when file logging is off.
    pub fn logs_dir(&self) -> Option<PathBuf> {
        let folder = self.logs_folder.trim();
        if folder.is_empty() {
            None
        } else {
            Some(PathBuf::from(folder))
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            show_timestamps: true,
            error_tail: default_error_tail(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Pipeline,
    Voices,
    Timeouts,
    Polling,
    FanOut,
    Logging,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 6] = [
        ConfigSection::Pipeline,
        ConfigSection::Voices,
        ConfigSection::Timeouts,
        ConfigSection::Polling,
        ConfigSection::FanOut,
        ConfigSection::Logging,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Pipeline => "pipeline",
            ConfigSection::Voices => "voices",
            ConfigSection::Timeouts => "timeouts",
            ConfigSection::Polling => "polling",
            ConfigSection::FanOut => "fan_out",
            ConfigSection::Logging => "logging",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.voices.voice_for("fr"), Some("Celine"));
        assert_eq!(settings.pipeline.source_language, "en-US");
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("[voices]"));
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[pipeline]\nkey_scheme = \"run_scoped\"\n[voices]\nit = \"Bianca\"";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.pipeline.key_scheme, KeyScheme::RunScoped);
        assert_eq!(parsed.pipeline.audio_format, "mp3");
        assert_eq!(parsed.voices.voice_for("it"), Some("Bianca"));
        assert_eq!(parsed.voices.voice_for("es"), None);
        assert_eq!(parsed.polling.aggregate_checks, 10);
    }

    #[test]
    fn validate_rejects_unsupported_default_target() {
        let mut settings = Settings::default();
        settings.pipeline.target_languages.push("xx".into());
        let err = settings.validate().unwrap_err();
        assert!(err.contains("'xx'"));

        let mut settings = Settings::default();
        settings.pipeline.source_language = " ".into();
        assert!(settings.validate().is_err());
    }
}
