//! Speech-to-text stage: one job per run.

use std::sync::Arc;

use serde_json::Value;

use crate::engines::{bounded, EngineJobState, SpeechToTextEngine, TranscriptionJob, TranscriptionRequest};
use crate::models::keys::job_name;
use crate::models::{AggregateStatus, JobHandle, ObjectRef, StageKind, StageResult, StageStatus, WorkItem};
use crate::orchestrator::errors::{DriverResult, StageError};
use crate::orchestrator::step::Stage;
use crate::orchestrator::types::{Context, StatusReport};

/// Container formats the speech engine accepts directly.
const MEDIA_FORMATS: &[&str] = &["mp3", "mp4", "wav", "flac", "ogg", "amr", "webm", "m4a"];

pub struct TranscriptionDriver {
    engine: Arc<dyn SpeechToTextEngine>,
}

impl TranscriptionDriver {
    pub fn new(engine: Arc<dyn SpeechToTextEngine>) -> Self {
        Self { engine }
    }

    /// Start the transcription job for `item`.
    ///
    /// Fails with `NotFound` before anything is submitted when the uploaded
    /// object is missing.
    pub fn submit(&self, ctx: &Context, item: &WorkItem) -> DriverResult<JobHandle> {
        let source = item.source();
        match ctx.store.exists(&source.bucket, &source.key) {
            Ok(true) => {}
            Ok(false) => return Err(StageError::not_found(&source.bucket, &source.key)),
            Err(e) => return Err(StageError::storage("check source object", e)),
        }

        let pipeline = &ctx.settings.pipeline;
        let submitted_at = ctx.now();
        let keys = ctx.keys_at(item, submitted_at);
        let language = pipeline.source_language.clone();

        let request = TranscriptionRequest {
            job_name: job_name(keys.stem(), submitted_at),
            media: source,
            media_format: media_format(item.original_filename(), &pipeline.media_format),
            language_code: language.clone(),
            output: item.object(keys.transcript(&language)),
        };

        ctx.logger.info(&format!(
            "Submitting job {} for {} ({})",
            request.job_name,
            request.media,
            request.media_format
        ));

        let engine = Arc::clone(&self.engine);
        let call = request.clone();
        let job_id = bounded(ctx.settings.timeouts.transcription(), move || engine.submit(&call))
            .map_err(|e| StageError::engine("speech-to-text", e))?;

        ctx.logger.detail(&format!("engine job id {}", job_id));

        Ok(JobHandle {
            stage: StageKind::Transcription,
            job_name: request.job_name,
            job_id,
            language,
            submitted_at,
            output: request.output,
        })
    }

    /// Poll the job once. On completion the engine's JSON envelope is
    /// replaced by the plain transcript text under the same key.
    pub fn check_status(
        &self,
        ctx: &Context,
        item: &WorkItem,
        handle: &JobHandle,
        attempt: u32,
    ) -> StatusReport {
        let result = self.poll_once(ctx, item, handle);

        let budget = ctx.settings.polling.transcription_checks;
        let result = match result {
            StageResult::Pending if attempt >= budget => StageResult::failed(format!(
                "job {} did not finish within {} checks",
                handle.job_name, budget
            )),
            other => other,
        };

        let status = match &result {
            StageResult::Pending => StageStatus::InProgress,
            StageResult::Completed(_) => StageStatus::Completed,
            StageResult::Failed(_) => StageStatus::Failed,
        };
        let error = match &result {
            StageResult::Failed(reason) => Some(reason.clone()),
            _ => None,
        };

        let mut entries = AggregateStatus::new();
        entries.insert(handle.language.clone(), result);

        StatusReport {
            stage: StageKind::Transcription,
            status,
            entries,
            attempt,
            error,
        }
    }

    fn poll_once(&self, ctx: &Context, item: &WorkItem, handle: &JobHandle) -> StageResult {
        let engine = Arc::clone(&self.engine);
        let job_id = handle.job_id.clone();
        let job = match bounded(ctx.settings.timeouts.transcription(), move || engine.poll(&job_id)) {
            Ok(job) => job,
            Err(e) => {
                ctx.logger.error(&format!("Polling {} failed: {}", handle.job_name, e));
                return StageResult::failed(format!("speech-to-text engine error: {}", e));
            }
        };

        match job.state {
            EngineJobState::Queued | EngineJobState::InProgress => {
                ctx.logger.debug(&format!("Job {} still running", handle.job_name));
                StageResult::Pending
            }
            EngineJobState::Failed => {
                let reason = job
                    .failure_reason
                    .unwrap_or_else(|| "transcription job failed".to_string());
                ctx.logger.error(&format!("Job {} failed: {}", handle.job_name, reason));
                StageResult::Failed(reason)
            }
            EngineJobState::Completed => match self.finish(ctx, item, handle, job) {
                Ok(location) => {
                    ctx.logger.success(&format!("Transcript ready at {}", location));
                    StageResult::Completed(location)
                }
                Err(reason) => {
                    ctx.logger.error(&reason);
                    ctx.logger.show_tail("transcription");
                    StageResult::Failed(reason)
                }
            },
        }
    }

    fn finish(
        &self,
        ctx: &Context,
        item: &WorkItem,
        handle: &JobHandle,
        job: TranscriptionJob,
    ) -> Result<ObjectRef, String> {
        let location = match job.transcript_uri {
            Some(uri) => ObjectRef::parse_in_bucket(&uri, item.bucket()).map_err(|e| e.to_string())?,
            None => handle.output.clone(),
        };

        let raw = ctx
            .store
            .get(&location.bucket, &location.key)
            .map_err(|e| format!("storage error reading {}: {}", location, e))?;

        if let Some(text) = extract_transcript(&raw)? {
            ctx.logger.detail(&format!(
                "normalizing {} ({} bytes of text)",
                location,
                text.len()
            ));
            ctx.store
                .put(&location.bucket, &location.key, text.as_bytes())
                .map_err(|e| format!("storage error writing {}: {}", location, e))?;
        }

        Ok(location)
    }
}

impl Stage for TranscriptionDriver {
    fn kind(&self) -> StageKind {
        StageKind::Transcription
    }

    fn name(&self) -> &str {
        "Transcription"
    }

    fn description(&self) -> &str {
        "Speech-to-text of the uploaded recording"
    }

    fn validate_input(&self, ctx: &Context, item: &WorkItem) -> DriverResult<()> {
        if ctx.settings.pipeline.source_language.trim().is_empty() {
            return Err(StageError::invalid_configuration("no source language configured"));
        }
        if item.original_filename().is_empty() {
            return Err(StageError::invalid_input(format!(
                "key '{}' has no file name",
                item.key()
            )));
        }
        Ok(())
    }
}

/// Media format from the file extension, or `fallback` when it is unknown.
fn media_format(filename: &str, fallback: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| MEDIA_FORMATS.contains(&ext.as_str()))
        .unwrap_or_else(|| fallback.to_string())
}

/// Plain transcript from an engine envelope.
///
/// `Ok(None)` means the payload is not an envelope and has already been
/// normalized by an earlier check.
fn extract_transcript(raw: &[u8]) -> Result<Option<String>, String> {
    let value: Value = match serde_json::from_slice(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Ok(None),
    };

    value
        .pointer("/results/transcripts/0/transcript")
        .and_then(Value::as_str)
        .map(|text| Some(text.to_string()))
        .ok_or_else(|| "transcript envelope has no results.transcripts[0].transcript".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::mock::MockSpeechToText;
    use crate::models::keys::format_timestamp;
    use crate::orchestrator::stages::test_support::{context, settings, work_item};
    use crate::storage::{MemoryObjectStore, ObjectStore};
    use chrono::{TimeZone, Utc};

    fn store_with_source() -> Arc<MemoryObjectStore> {
        Arc::new(MemoryObjectStore::new().with_object("media", "audio_inputs/talk.mp3", b"ID3".to_vec()))
    }

    #[test]
    fn missing_source_submits_nothing() {
        let store = Arc::new(MemoryObjectStore::new());
        let engine = Arc::new(MockSpeechToText::new(store.clone()));
        let driver = TranscriptionDriver::new(engine.clone());
        let ctx = context(store, settings());

        let err = driver.submit(&ctx, &work_item(&["es"])).unwrap_err();
        assert!(matches!(err, StageError::NotFound { .. }));
        assert_eq!(engine.submissions(), 0);
    }

    #[test]
    fn submit_builds_deterministic_request() {
        let store = store_with_source();
        let engine = Arc::new(MockSpeechToText::new(store.clone()));
        let driver = TranscriptionDriver::new(engine.clone());
        let ctx = context(store, settings());

        let handle = driver.submit(&ctx, &work_item(&["es"])).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(handle.job_name, format!("talk-{}", at.timestamp()));
        assert_eq!(handle.language, "en-US");
        assert_eq!(
            handle.output.key,
            format!("transcripts/talk_transcript_en-US-{}.txt", format_timestamp(at))
        );
        assert_eq!(engine.submissions(), 1);
    }

    #[test]
    fn completed_job_is_normalized_in_place() {
        let store = store_with_source();
        let engine = Arc::new(
            MockSpeechToText::new(store.clone())
                .with_transcript("good morning everyone")
                .completes_after(1),
        );
        let driver = TranscriptionDriver::new(engine);
        let ctx = context(store.clone(), settings());
        let item = work_item(&["es"]);
        let handle = driver.submit(&ctx, &item).unwrap();

        let first = driver.check_status(&ctx, &item, &handle, 1);
        assert_eq!(first.status, StageStatus::InProgress);

        let second = driver.check_status(&ctx, &item, &handle, 2);
        assert_eq!(second.status, StageStatus::Completed);
        let location = second.entries.get("en-US").unwrap().location().unwrap().clone();
        assert_eq!(location, handle.output);
        assert_eq!(
            store.get_text(&location.bucket, &location.key).unwrap(),
            "good morning everyone"
        );

        // A repeated check finds plain text and leaves it alone.
        let third = driver.check_status(&ctx, &item, &handle, 3);
        assert_eq!(third.status, StageStatus::Completed);
        assert_eq!(
            store.get_text(&location.bucket, &location.key).unwrap(),
            "good morning everyone"
        );
    }

    #[test]
    fn engine_failure_is_reported() {
        let store = store_with_source();
        let engine = Arc::new(
            MockSpeechToText::new(store.clone())
                .completes_after(0)
                .with_job_failure("unsupported media"),
        );
        let driver = TranscriptionDriver::new(engine);
        let ctx = context(store, settings());
        let item = work_item(&["es"]);
        let handle = driver.submit(&ctx, &item).unwrap();

        let report = driver.check_status(&ctx, &item, &handle, 1);
        assert_eq!(report.status, StageStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("unsupported media"));
    }

    #[test]
    fn panicking_poll_fails_even_without_timeout() {
        for transcription_ms in [0, 1_000] {
            let store = store_with_source();
            let engine = Arc::new(MockSpeechToText::new(store.clone()).with_poll_panic());
            let driver = TranscriptionDriver::new(engine);
            let mut settings = settings();
            settings.timeouts.transcription_ms = transcription_ms;
            let ctx = context(store, settings);
            let item = work_item(&["es"]);
            let handle = driver.submit(&ctx, &item).unwrap();

            let report = driver.check_status(&ctx, &item, &handle, 1);
            assert_eq!(report.status, StageStatus::Failed, "limit {}ms", transcription_ms);
            assert!(report.error.unwrap().contains("panicked"));
        }
    }

    #[test]
    fn rejected_submit_is_engine_error() {
        let store = store_with_source();
        let engine = Arc::new(MockSpeechToText::new(store.clone()).with_submit_failure());
        let driver = TranscriptionDriver::new(engine.clone());
        let ctx = context(store, settings());

        let err = driver.submit(&ctx, &work_item(&["es"])).unwrap_err();
        assert!(matches!(err, StageError::Engine { .. }));
        assert_eq!(err.kind(), crate::orchestrator::ErrorKind::EngineError);
        assert_eq!(engine.submissions(), 0);
    }

    #[test]
    fn malformed_envelope_fails() {
        let store = store_with_source();
        let engine = Arc::new(
            MockSpeechToText::new(store.clone())
                .completes_after(0)
                .with_raw_output(br#"{"results":{"items":[]}}"#.to_vec()),
        );
        let driver = TranscriptionDriver::new(engine);
        let ctx = context(store, settings());
        let item = work_item(&["es"]);
        let handle = driver.submit(&ctx, &item).unwrap();

        let report = driver.check_status(&ctx, &item, &handle, 1);
        assert_eq!(report.status, StageStatus::Failed);
        assert!(report.error.unwrap().contains("results.transcripts[0].transcript"));
    }

    #[test]
    fn pending_job_fails_after_budget() {
        let store = store_with_source();
        let engine = Arc::new(MockSpeechToText::new(store.clone()).completes_after(100));
        let driver = TranscriptionDriver::new(engine);
        let mut settings = settings();
        settings.polling.transcription_checks = 2;
        let ctx = context(store, settings);
        let item = work_item(&["es"]);
        let handle = driver.submit(&ctx, &item).unwrap();

        assert_eq!(driver.check_status(&ctx, &item, &handle, 1).status, StageStatus::InProgress);
        let report = driver.check_status(&ctx, &item, &handle, 2);
        assert_eq!(report.status, StageStatus::Failed);
        assert!(report.error.unwrap().contains("within 2 checks"));
    }

    #[test]
    fn media_format_from_extension() {
        assert_eq!(media_format("talk.WAV", "mp3"), "wav");
        assert_eq!(media_format("talk", "mp3"), "mp3");
        assert_eq!(media_format("talk.xyz", "flac"), "flac");
    }

    #[test]
    fn plain_text_is_already_normalized() {
        assert_eq!(extract_transcript(b"hello there").unwrap(), None);
        assert_eq!(
            extract_transcript(br#"{"results":{"transcripts":[{"transcript":"hi"}]}}"#).unwrap(),
            Some("hi".to_string())
        );
    }
}
