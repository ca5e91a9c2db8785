//! Text-to-speech stage: one audio file per translated language.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engines::{bounded, TextToSpeechEngine};
use crate::models::{AggregateStatus, LanguageCode, StageKind, StageResult, WorkItem};
use crate::orchestrator::aggregate::{reverify, StatusPolicy};
use crate::orchestrator::errors::{DriverResult, StageError};
use crate::orchestrator::fan_out::run_per_language;
use crate::orchestrator::step::Stage;
use crate::orchestrator::types::{Context, StatusReport, SynthesisSubmission};

pub struct SynthesisDriver {
    engine: Arc<dyn TextToSpeechEngine>,
}

impl SynthesisDriver {
    pub fn new(engine: Arc<dyn TextToSpeechEngine>) -> Self {
        Self { engine }
    }

    /// Synthesize audio for every target language that has text.
    ///
    /// Languages without text are skipped and not recorded. Every remaining
    /// language needs a configured voice; that is checked before any audio
    /// is produced.
    pub fn submit(
        &self,
        ctx: &Context,
        item: &WorkItem,
        texts: &BTreeMap<LanguageCode, String>,
    ) -> DriverResult<SynthesisSubmission> {
        let (languages, skipped): (Vec<LanguageCode>, Vec<LanguageCode>) = item
            .target_languages()
            .iter()
            .cloned()
            .partition(|lang| texts.get(lang).is_some_and(|t| !t.trim().is_empty()));

        if languages.is_empty() {
            return Err(StageError::invalid_input("no translations available"));
        }
        for lang in &skipped {
            ctx.logger.warn(&format!("{}: no translated text, skipping", lang));
        }

        let voices = &ctx.settings.voices;
        let mut assigned: BTreeMap<&str, String> = BTreeMap::new();
        for lang in &languages {
            let voice = voices.voice_for(lang).ok_or_else(|| {
                StageError::invalid_configuration(format!(
                    "no voice configured for language '{}'",
                    lang
                ))
            })?;
            assigned.insert(lang.as_str(), voice.to_string());
        }

        let keys = ctx.keys(item);
        let format = ctx.settings.pipeline.audio_format.clone();
        let limit = ctx.settings.timeouts.synthesis();

        let entries = run_per_language(&languages, ctx.settings.fan_out.parallel, |lang| {
            let engine = Arc::clone(&self.engine);
            let text = texts.get(lang).cloned().unwrap_or_default();
            let voice = assigned.get(lang).cloned().unwrap_or_default();
            let fmt = format.clone();

            let audio = match bounded(limit, move || engine.synthesize(&text, &voice, &fmt)) {
                Ok(audio) => audio,
                Err(e) => {
                    ctx.logger.error(&format!("{}: synthesis failed: {}", lang, e));
                    return StageResult::failed(format!("text-to-speech engine error: {}", e));
                }
            };

            let output = item.object(keys.audio(lang, &format));
            match ctx.store.put(&output.bucket, &output.key, &audio) {
                Ok(()) => {
                    ctx.logger.detail(&format!("{} -> {} ({} bytes)", lang, output, audio.len()));
                    StageResult::Completed(output)
                }
                Err(e) => {
                    ctx.logger.error(&format!("{}: cannot write {}: {}", lang, output, e));
                    StageResult::failed(format!("storage error writing {}: {}", output, e))
                }
            }
        });

        let done = entries.completed_locations().len();
        if !entries.has_failures() {
            ctx.logger.success(&format!("{} audio files written", done));
        } else {
            ctx.logger.warn(&format!("{} of {} audio files written", done, entries.len()));
        }

        Ok(SynthesisSubmission {
            stage: StageKind::Synthesis,
            entries,
            skipped,
        })
    }

    /// Re-verify every recorded audio object against the store.
    pub fn check_status(&self, ctx: &Context, submitted: &AggregateStatus, attempt: u32) -> StatusReport {
        let entries: AggregateStatus = submitted
            .iter()
            .map(|(lang, recorded)| (lang.clone(), reverify(ctx.store.as_ref(), Some(recorded))))
            .collect();

        let status = StatusPolicy::new(ctx.settings.polling.aggregate_checks).resolve(&entries, attempt);
        ctx.logger.debug(&format!("Synthesis check {}: {}", attempt, status));

        StatusReport {
            stage: StageKind::Synthesis,
            status,
            entries,
            attempt,
            error: None,
        }
    }
}

impl Stage for SynthesisDriver {
    fn kind(&self) -> StageKind {
        StageKind::Synthesis
    }

    fn name(&self) -> &str {
        "Synthesis"
    }

    fn description(&self) -> &str {
        "Text-to-speech of each translation"
    }

    fn validate_input(&self, ctx: &Context, _item: &WorkItem) -> DriverResult<()> {
        if ctx.settings.pipeline.audio_format.trim().is_empty() {
            return Err(StageError::invalid_configuration("no audio format configured"));
        }
        Ok(())
    }
}
