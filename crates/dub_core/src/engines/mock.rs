//! Scripted engines for tests and local dry runs.
//!
//! Each mock is configured with builder methods and records how often it was
//! called, so tests can assert both the outcome and that no work was
//! submitted when a stage should have short-circuited.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use super::{
    EngineError, EngineJobState, EngineResult, SpeechToTextEngine, TextToSpeechEngine,
    TranscriptionJob, TranscriptionRequest, TranslationEngine,
};
use crate::storage::ObjectStore;

struct MockJob {
    request: TranscriptionRequest,
    polls: u32,
}

/// Speech-to-text engine that "finishes" a job after a set number of polls
/// by writing a transcript envelope to the requested output location.
pub struct MockSpeechToText {
    store: Arc<dyn ObjectStore>,
    transcript: String,
    raw_output: Option<Vec<u8>>,
    completes_after: u32,
    reject_submit: bool,
    job_failure: Option<String>,
    panic_on_poll: bool,
    jobs: Mutex<HashMap<String, MockJob>>,
    submissions: AtomicUsize,
}

impl MockSpeechToText {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            transcript: "hello world".to_string(),
            raw_output: None,
            completes_after: 1,
            reject_submit: false,
            job_failure: None,
            panic_on_poll: false,
            jobs: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
        }
    }

    /// Text placed in `results.transcripts[0].transcript`.
    pub fn with_transcript(mut self, text: &str) -> Self {
        self.transcript = text.to_string();
        self
    }

    /// Write these exact bytes instead of a well-formed envelope.
    pub fn with_raw_output(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.raw_output = Some(bytes.into());
        self
    }

    /// Number of polls that report the job as still running. Zero completes
    /// on the first poll.
    pub fn completes_after(mut self, polls: u32) -> Self {
        self.completes_after = polls;
        self
    }

    pub fn with_submit_failure(mut self) -> Self {
        self.reject_submit = true;
        self
    }

    /// The job is accepted but ends in the engine's FAILED state.
    pub fn with_job_failure(mut self, reason: &str) -> Self {
        self.job_failure = Some(reason.to_string());
        self
    }

    /// Every poll panics, as a misbehaving client library would.
    pub fn with_poll_panic(mut self) -> Self {
        self.panic_on_poll = true;
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn envelope(&self, request: &TranscriptionRequest) -> Vec<u8> {
        if let Some(raw) = &self.raw_output {
            return raw.clone();
        }
        json!({
            "jobName": request.job_name,
            "status": "COMPLETED",
            "results": {
                "transcripts": [{ "transcript": self.transcript }],
                "items": []
            }
        })
        .to_string()
        .into_bytes()
    }
}

impl SpeechToTextEngine for MockSpeechToText {
    fn submit(&self, request: &TranscriptionRequest) -> EngineResult<String> {
        if self.reject_submit {
            return Err(EngineError::Rejected("mock submit failure".into()));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = format!("{}-job{}", request.job_name, n);
        self.jobs.lock().insert(
            job_id.clone(),
            MockJob {
                request: request.clone(),
                polls: 0,
            },
        );
        Ok(job_id)
    }

    fn poll(&self, job_id: &str) -> EngineResult<TranscriptionJob> {
        if self.panic_on_poll {
            panic!("mock poll panic for {}", job_id);
        }
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| EngineError::JobNotFound(job_id.to_string()))?;
        job.polls += 1;

        if job.polls <= self.completes_after {
            let state = if job.polls == 1 {
                EngineJobState::Queued
            } else {
                EngineJobState::InProgress
            };
            return Ok(TranscriptionJob {
                state,
                transcript_uri: None,
                failure_reason: None,
            });
        }

        if let Some(reason) = &self.job_failure {
            return Ok(TranscriptionJob {
                state: EngineJobState::Failed,
                transcript_uri: None,
                failure_reason: Some(reason.clone()),
            });
        }

        let output = job.request.output.clone();
        if !self
            .store
            .exists(&output.bucket, &output.key)
            .map_err(|e| EngineError::Unavailable(e.to_string()))?
        {
            let body = self.envelope(&job.request);
            self.store
                .put(&output.bucket, &output.key, &body)
                .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        }

        Ok(TranscriptionJob {
            state: EngineJobState::Completed,
            transcript_uri: Some(format!(
                "https://s3.us-east-1.amazonaws.com/{}/{}",
                output.bucket, output.key
            )),
            failure_reason: None,
        })
    }
}

/// Translation engine with per-language scripted answers.
///
/// Unscripted languages translate to `[{target}] {text}`.
#[derive(Default)]
pub struct MockTranslator {
    responses: HashMap<String, String>,
    failures: HashSet<String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, target: &str, text: &str) -> Self {
        self.responses.insert(target.to_string(), text.to_string());
        self
    }

    pub fn with_failure(mut self, target: &str) -> Self {
        self.failures.insert(target.to_string());
        self
    }

    /// Panic inside the call for `target`.
    pub fn with_panic(mut self, target: &str) -> Self {
        self.panics.insert(target.to_string());
        self
    }

    /// Sleep for `delay` before answering for `target`.
    pub fn with_delay(mut self, target: &str, delay: Duration) -> Self {
        self.delays.insert(target.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TranslationEngine for MockTranslator {
    fn translate(&self, text: &str, _source: &str, target: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(target) {
            thread::sleep(*delay);
        }
        if self.panics.contains(target) {
            panic!("mock translator panicked for {}", target);
        }
        if self.failures.contains(target) {
            return Err(EngineError::Rejected(format!(
                "unsupported target language {}",
                target
            )));
        }
        Ok(self
            .responses
            .get(target)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target, text)))
    }
}

/// Synthesizer returning `{voice}:{text}` as the audio bytes.
#[derive(Default)]
pub struct MockSynthesizer {
    failing_voices: HashSet<String>,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, voice_id: &str) -> Self {
        self.failing_voices.insert(voice_id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextToSpeechEngine for MockSynthesizer {
    fn synthesize(&self, text: &str, voice_id: &str, _format: &str) -> EngineResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_voices.contains(voice_id) {
            return Err(EngineError::Unavailable(format!("voice {} throttled", voice_id)));
        }
        Ok(format!("{}:{}", voice_id, text).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectRef;
    use crate::storage::MemoryObjectStore;

    fn request() -> TranscriptionRequest {
        TranscriptionRequest {
            job_name: "talk-1".into(),
            media: ObjectRef::new("media", "talk.mp3"),
            media_format: "mp3".into(),
            language_code: "en-US".into(),
            output: ObjectRef::new("media", "transcripts/t.txt"),
        }
    }

    #[test]
    fn speech_job_completes_after_polls() {
        let store = Arc::new(MemoryObjectStore::new());
        let engine = MockSpeechToText::new(store.clone()).completes_after(2);
        let id = engine.submit(&request()).unwrap();

        assert_eq!(engine.poll(&id).unwrap().state, EngineJobState::Queued);
        assert_eq!(engine.poll(&id).unwrap().state, EngineJobState::InProgress);
        let done = engine.poll(&id).unwrap();
        assert_eq!(done.state, EngineJobState::Completed);
        assert!(done.transcript_uri.unwrap().ends_with("/media/transcripts/t.txt"));

        let body = store.get_text("media", "transcripts/t.txt").unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["results"]["transcripts"][0]["transcript"], "hello world");
    }

    #[test]
    fn unknown_job_is_reported() {
        let engine = MockSpeechToText::new(Arc::new(MemoryObjectStore::new()));
        assert_eq!(
            engine.poll("nope").unwrap_err(),
            EngineError::JobNotFound("nope".into())
        );
    }

    #[test]
    fn translator_scripts() {
        let t = MockTranslator::new()
            .with_translation("es", "hola")
            .with_failure("fr");
        assert_eq!(t.translate("hi", "en", "es").unwrap(), "hola");
        assert_eq!(t.translate("hi", "en", "de").unwrap(), "[de] hi");
        assert!(t.translate("hi", "en", "fr").is_err());
        assert_eq!(t.calls(), 3);
    }
}
