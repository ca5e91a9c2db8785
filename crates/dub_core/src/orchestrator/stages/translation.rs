//! Machine translation stage: one unit per target language.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engines::{bounded, TranslationEngine};
use crate::models::{AggregateStatus, LanguageCode, ObjectRef, StageKind, StageResult, WorkItem};
use crate::orchestrator::aggregate::{reverify, StatusPolicy};
use crate::orchestrator::errors::{DriverResult, StageError};
use crate::orchestrator::fan_out::run_per_language;
use crate::orchestrator::step::Stage;
use crate::orchestrator::types::{Context, StatusReport, TranscriptSource, TranslationSubmission};

pub struct TranslationDriver {
    engine: Arc<dyn TranslationEngine>,
}

impl TranslationDriver {
    pub fn new(engine: Arc<dyn TranslationEngine>) -> Self {
        Self { engine }
    }

    /// Translate the transcript into every target language of `item`.
    ///
    /// Only problems with the transcript itself fail the whole stage. A
    /// language whose translation or write fails is recorded as failed and
    /// its siblings carry on.
    pub fn submit(
        &self,
        ctx: &Context,
        item: &WorkItem,
        source: &TranscriptSource,
    ) -> DriverResult<TranslationSubmission> {
        let location = resolve_source(item, source)?;
        let transcript = ctx
            .store
            .get_text(&location.bucket, &location.key)
            .map_err(|e| StageError::storage("read transcript", e))?;

        if transcript.trim().is_empty() {
            ctx.logger.warn(&format!("Transcript {} is empty", location));
        }
        ctx.logger.info(&format!(
            "Translating {} characters into {}",
            transcript.chars().count(),
            item.target_languages().join(", ")
        ));

        let text: Arc<str> = Arc::from(transcript);
        let keys = ctx.keys(item);
        let source_language = ctx.settings.pipeline.translation_source_language.clone();
        let limit = ctx.settings.timeouts.translation();

        let entries = run_per_language(
            item.target_languages(),
            ctx.settings.fan_out.parallel,
            |lang| {
                let engine = Arc::clone(&self.engine);
                let text = Arc::clone(&text);
                let (src, tgt) = (source_language.clone(), lang.to_string());

                let translated = match bounded(limit, move || engine.translate(&text, &src, &tgt)) {
                    Ok(translated) => translated,
                    Err(e) => {
                        ctx.logger.error(&format!("{}: translation failed: {}", lang, e));
                        return StageResult::failed(format!("translation engine error: {}", e));
                    }
                };

                let output = item.object(keys.translation(lang));
                match ctx.store.put(&output.bucket, &output.key, translated.as_bytes()) {
                    Ok(()) => {
                        ctx.logger.detail(&format!("{} -> {}", lang, output));
                        StageResult::Completed(output)
                    }
                    Err(e) => {
                        ctx.logger.error(&format!("{}: cannot write {}: {}", lang, output, e));
                        StageResult::failed(format!("storage error writing {}: {}", output, e))
                    }
                }
            },
        );

        log_summary(ctx, &entries);
        Ok(TranslationSubmission {
            stage: StageKind::Translation,
            entries,
            skipped: Vec::new(),
        })
    }

    /// Re-verify every recorded translation against the store.
    ///
    /// `submitted` is the aggregate returned by [`submit`](Self::submit), not
    /// a previous report, so an object that briefly reads as missing can
    /// still come back as completed on a later check.
    pub fn check_status(
        &self,
        ctx: &Context,
        item: &WorkItem,
        submitted: &AggregateStatus,
        attempt: u32,
    ) -> StatusReport {
        let entries: AggregateStatus = item
            .target_languages()
            .iter()
            .map(|lang| (lang.clone(), reverify(ctx.store.as_ref(), submitted.get(lang))))
            .collect();

        let status = StatusPolicy::new(ctx.settings.polling.aggregate_checks).resolve(&entries, attempt);
        ctx.logger.debug(&format!("Translation check {}: {}", attempt, status));

        StatusReport {
            stage: StageKind::Translation,
            status,
            entries,
            attempt,
            error: None,
        }
    }

    /// Read back the completed translations, keyed by language.
    pub fn load_texts(
        &self,
        ctx: &Context,
        entries: &AggregateStatus,
    ) -> DriverResult<BTreeMap<LanguageCode, String>> {
        entries
            .completed_locations()
            .into_iter()
            .map(|(lang, location)| {
                let text = ctx
                    .store
                    .get_text(&location.bucket, &location.key)
                    .map_err(|e| StageError::storage(format!("read {} translation", lang), e))?;
                Ok((lang, text))
            })
            .collect()
    }
}

impl Stage for TranslationDriver {
    fn kind(&self) -> StageKind {
        StageKind::Translation
    }

    fn name(&self) -> &str {
        "Translation"
    }

    fn description(&self) -> &str {
        "Machine translation into each target language"
    }

    fn validate_input(&self, ctx: &Context, item: &WorkItem) -> DriverResult<()> {
        if ctx.settings.pipeline.translation_source_language.trim().is_empty() {
            return Err(StageError::invalid_configuration(
                "no translation source language configured",
            ));
        }
        if item.target_languages().is_empty() {
            return Err(StageError::invalid_input("no target languages"));
        }
        Ok(())
    }
}

fn resolve_source(item: &WorkItem, source: &TranscriptSource) -> DriverResult<ObjectRef> {
    match source {
        TranscriptSource::Object(location) if location.bucket == item.bucket() => {
            Ok(location.clone())
        }
        TranscriptSource::Object(location) => Ok(ObjectRef::parse_in_bucket(&location.uri(), item.bucket())?),
        TranscriptSource::Uri(uri) => Ok(ObjectRef::parse_in_bucket(uri, item.bucket())?),
    }
}

fn log_summary(ctx: &Context, entries: &AggregateStatus) {
    let done = entries.iter().filter(|(_, r)| r.is_completed()).count();
    if !entries.has_failures() {
        ctx.logger.success(&format!("{} translations written", done));
    } else {
        ctx.logger.warn(&format!("{} of {} translations written", done, entries.len()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockTranslator;
    use crate::models::StageStatus;
    use crate::orchestrator::stages::test_support::{context, settings, work_item};
    use crate::storage::{MemoryObjectStore, ObjectStore};
    use std::time::Duration;

    const TRANSCRIPT: &str = "transcripts/talk_transcript_en-US-20240501_120000.000.txt";

    fn store() -> Arc<MemoryObjectStore> {
        Arc::new(MemoryObjectStore::new().with_object("media", TRANSCRIPT, b"good morning".to_vec()))
    }

    fn source() -> TranscriptSource {
        TranscriptSource::Object(ObjectRef::new("media", TRANSCRIPT))
    }

    #[test]
    fn failing_language_does_not_affect_siblings() {
        let store = store();
        let driver = TranslationDriver::new(Arc::new(
            MockTranslator::new()
                .with_translation("es", "buenos dias")
                .with_failure("fr"),
        ));
        let ctx = context(store.clone(), settings());

        let submission = driver.submit(&ctx, &work_item(&["es", "fr"]), &source()).unwrap();

        let es = submission.entries.get("es").unwrap().location().unwrap().clone();
        assert!(es.key.starts_with("translations/talk_translation_es-"));
        assert_eq!(store.get_text("media", &es.key).unwrap(), "buenos dias");
        assert!(submission.entries.get("fr").unwrap().is_failed());
        assert_ne!(submission.overall(), StageStatus::Completed);
    }

    #[test]
    fn sequential_fan_out_matches_parallel() {
        let mut settings = settings();
        settings.fan_out.parallel = false;
        let driver = TranslationDriver::new(Arc::new(MockTranslator::new().with_panic("de")));
        let ctx = context(store(), settings);

        let submission = driver
            .submit(&ctx, &work_item(&["es", "de"]), &source())
            .unwrap();
        assert!(submission.entries.get("es").unwrap().is_completed());
        assert!(submission.entries.get("de").unwrap().is_failed());
    }

    #[test]
    fn slow_language_times_out_alone() {
        let store = store();
        let mut settings = settings();
        settings.timeouts.translation_ms = 50;
        let driver = TranslationDriver::new(Arc::new(
            MockTranslator::new().with_delay("fr", Duration::from_millis(1_000)),
        ));
        let ctx = context(store.clone(), settings);
        let item = work_item(&["es", "fr", "de"]);

        let submission = driver.submit(&ctx, &item, &source()).unwrap();
        assert!(submission.entries.get("es").unwrap().is_completed());
        assert!(submission.entries.get("de").unwrap().is_completed());
        match submission.entries.get("fr").unwrap() {
            StageResult::Failed(reason) => assert!(reason.contains("timed out"), "{}", reason),
            other => panic!("expected fr to fail, got {:?}", other),
        }

        let report = driver.check_status(&ctx, &item, &submission.entries, 1);
        assert_eq!(report.status, StageStatus::PartiallyFailed);
    }

    #[test]
    fn uri_source_outside_bucket_is_rejected() {
        let driver = TranslationDriver::new(Arc::new(MockTranslator::new()));
        let ctx = context(store(), settings());
        let err = driver
            .submit(
                &ctx,
                &work_item(&["es"]),
                &TranscriptSource::Uri(format!("s3://elsewhere/{}", TRANSCRIPT)),
            )
            .unwrap_err();
        assert!(matches!(err, StageError::InvalidReference(_)));
    }

    #[test]
    fn regional_uri_source_is_accepted() {
        let translator = Arc::new(MockTranslator::new());
        let driver = TranslationDriver::new(translator.clone());
        let ctx = context(store(), settings());
        let uri = format!("https://s3.eu-west-1.amazonaws.com/media/{}", TRANSCRIPT);

        let submission = driver
            .submit(&ctx, &work_item(&["es", "fr"]), &TranscriptSource::Uri(uri))
            .unwrap();
        assert_eq!(submission.overall(), StageStatus::Completed);
        assert_eq!(translator.calls(), 2);
    }

    #[test]
    fn missing_transcript_is_not_found() {
        let translator = Arc::new(MockTranslator::new());
        let driver = TranslationDriver::new(translator.clone());
        let ctx = context(Arc::new(MemoryObjectStore::new()), settings());

        let err = driver.submit(&ctx, &work_item(&["es"]), &source()).unwrap_err();
        assert!(matches!(err, StageError::NotFound { .. }));
        assert_eq!(translator.calls(), 0);
    }

    #[test]
    fn check_status_reverifies_locations() {
        let store = store();
        let driver = TranslationDriver::new(Arc::new(MockTranslator::new()));
        let ctx = context(store.clone(), settings());
        let item = work_item(&["es", "fr"]);
        let submission = driver.submit(&ctx, &item, &source()).unwrap();

        let report = driver.check_status(&ctx, &item, &submission.entries, 1);
        assert_eq!(report.status, StageStatus::Completed);

        let fr = submission.entries.get("fr").unwrap().location().unwrap().clone();
        store.remove(&fr.bucket, &fr.key);
        let report = driver.check_status(&ctx, &item, &submission.entries, 2);
        assert_eq!(report.status, StageStatus::InProgress);
        assert_eq!(report.entries.get("fr"), Some(&StageResult::Pending));

        store.break_prefix("translations/");
        let report = driver.check_status(&ctx, &item, &submission.entries, 3);
        assert!(report.entries.get("es").unwrap().is_failed());
    }

    #[test]
    fn check_status_marks_unrecorded_languages_pending() {
        let driver = TranslationDriver::new(Arc::new(MockTranslator::new()));
        let ctx = context(store(), settings());
        let item = work_item(&["es", "fr"]);

        let report = driver.check_status(&ctx, &item, &AggregateStatus::new(), 1);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.status, StageStatus::InProgress);
    }

    #[test]
    fn load_texts_reads_completed_only() {
        let driver = TranslationDriver::new(Arc::new(
            MockTranslator::new().with_translation("es", "hola").with_failure("fr"),
        ));
        let ctx = context(store(), settings());
        let submission = driver
            .submit(&ctx, &work_item(&["es", "fr"]), &source())
            .unwrap();

        let texts = driver.load_texts(&ctx, &submission.entries).unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts["es"], "hola");
    }
}
