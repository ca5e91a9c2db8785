//! Run orchestration: trigger handling and the per-run state machine.
//!
//! ```text
//! start ─► Transcribing ─► Translating ─► Synthesizing ─► Completed
//!               │               │               │
//!               └──► Failed ◄───┴───────────────┘
//!                               │               │
//!                               └─► PartiallyFailed
//! ```
//!
//! The orchestrator never waits on an engine. A scheduler keeps the returned
//! [`RunState`] and hands it back to [`Orchestrator::advance`] once per polling
//! interval until [`RunState::is_terminal`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, ConfigResult, Settings};
use crate::engines::{SpeechToTextEngine, TextToSpeechEngine, TranslationEngine};
use crate::logging::RunLogger;
use crate::models::{AggregateStatus, JobHandle, LanguageCode, StageKind, StageStatus, WorkItem};
use crate::storage::{ObjectStore, TimedStore};

use super::errors::{DriverResult, ErrorKind, PipelineError, PipelineResult, StageError};
use super::stages::{SynthesisDriver, TranscriptionDriver, TranslationDriver};
use super::step::Stage;
use super::types::{
    Context, StatusReport, SynthesisSubmission, TranscriptSource, TranslationSubmission,
};

/// Event that starts a run.
///
/// Accepts a storage notification (`Records[0].s3.bucket.name` and
/// `Records[0].s3.object.key`) or a direct `{bucket, key, target_languages}`
/// request. Notification keys are used as delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerEvent {
    Notification {
        #[serde(rename = "Records")]
        records: Vec<NotificationRecord>,
    },
    Direct {
        #[serde(default)]
        bucket: Option<String>,
        #[serde(default)]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_languages: Option<Vec<LanguageCode>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub s3: NotificationEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEntity {
    pub bucket: NamedBucket,
    pub object: NamedObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedBucket {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedObject {
    pub key: String,
}

impl TriggerEvent {
    pub fn direct(bucket: &str, key: &str) -> Self {
        TriggerEvent::Direct {
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
            target_languages: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, StageError> {
        serde_json::from_str(json)
            .map_err(|e| StageError::invalid_input(format!("unreadable trigger: {}", e)))
    }

    fn bucket_and_key(&self) -> (Option<&str>, Option<&str>) {
        match self {
            TriggerEvent::Notification { records } => match records.first() {
                Some(record) => (
                    Some(record.s3.bucket.name.as_str()),
                    Some(record.s3.object.key.as_str()),
                ),
                None => (None, None),
            },
            TriggerEvent::Direct { bucket, key, .. } => (bucket.as_deref(), key.as_deref()),
        }
    }

    fn target_languages(&self) -> Option<&[LanguageCode]> {
        match self {
            TriggerEvent::Direct {
                target_languages: Some(langs),
                ..
            } => Some(langs),
            _ => None,
        }
    }
}

/// Reply to a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    Started { state: RunState },
    Rejected { kind: ErrorKind, message: String },
}

/// Position of one run in the state machine.
///
/// Fan-out states keep the aggregate returned by their submit; every check
/// derives a fresh report from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Transcribing {
        work_item: WorkItem,
        handle: JobHandle,
        attempt: u32,
    },
    Translating {
        work_item: WorkItem,
        entries: AggregateStatus,
        attempt: u32,
    },
    Synthesizing {
        work_item: WorkItem,
        entries: AggregateStatus,
        attempt: u32,
    },
    Completed {
        work_item: WorkItem,
        audio: AggregateStatus,
    },
    PartiallyFailed {
        work_item: WorkItem,
        stage: StageKind,
        entries: AggregateStatus,
    },
    Failed {
        work_item: WorkItem,
        stage: StageKind,
        reason: String,
    },
}

impl RunState {
    pub fn work_item(&self) -> &WorkItem {
        match self {
            RunState::Transcribing { work_item, .. }
            | RunState::Translating { work_item, .. }
            | RunState::Synthesizing { work_item, .. }
            | RunState::Completed { work_item, .. }
            | RunState::PartiallyFailed { work_item, .. }
            | RunState::Failed { work_item, .. } => work_item,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed { .. } | RunState::PartiallyFailed { .. } | RunState::Failed { .. }
        )
    }

    /// Stage-level status of the run as a whole.
    pub fn status(&self) -> StageStatus {
        match self {
            RunState::Completed { .. } => StageStatus::Completed,
            RunState::PartiallyFailed { .. } => StageStatus::PartiallyFailed,
            RunState::Failed { .. } => StageStatus::Failed,
            _ => StageStatus::InProgress,
        }
    }

    /// Stage the run is in, or ended in.
    pub fn stage(&self) -> StageKind {
        match self {
            RunState::Transcribing { .. } => StageKind::Transcription,
            RunState::Translating { .. } => StageKind::Translation,
            RunState::Synthesizing { .. } | RunState::Completed { .. } => StageKind::Synthesis,
            RunState::PartiallyFailed { stage, .. } | RunState::Failed { stage, .. } => *stage,
        }
    }
}

/// Drives runs through transcription, translation and synthesis.
pub struct Orchestrator {
    settings: Arc<Settings>,
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    log_dir: Option<PathBuf>,
    transcription: TranscriptionDriver,
    translation: TranslationDriver,
    synthesis: SynthesisDriver,
}

impl Orchestrator {
    /// Rejects settings that fail [`Settings::validate`]. Store calls are
    /// bounded by `timeouts.store_ms` unless it is zero, and run logs go to
    /// `logging.logs_folder` unless it is empty.
    pub fn new(
        settings: Settings,
        store: Arc<dyn ObjectStore>,
        speech_to_text: Arc<dyn SpeechToTextEngine>,
        translator: Arc<dyn TranslationEngine>,
        text_to_speech: Arc<dyn TextToSpeechEngine>,
    ) -> ConfigResult<Self> {
        settings.validate().map_err(ConfigError::Invalid)?;

        let limit = settings.timeouts.store();
        let store: Arc<dyn ObjectStore> = if limit.is_zero() {
            store
        } else {
            Arc::new(TimedStore::new(store, limit))
        };

        Ok(Self {
            log_dir: settings.logging.logs_dir(),
            settings: Arc::new(settings),
            store,
            clock: Arc::new(SystemClock),
            transcription: TranscriptionDriver::new(speech_to_text),
            translation: TranslationDriver::new(translator),
            synthesis: SynthesisDriver::new(text_to_speech),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Append each run's log to `run-{run_id}.log` in this directory,
    /// overriding `logging.logs_folder`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate the trigger, build the work item and submit transcription.
    pub fn start(&self, trigger: &TriggerEvent) -> OrchestrationOutcome {
        match self.try_start(trigger) {
            Ok(state) => OrchestrationOutcome::Started { state },
            Err(e) => {
                tracing::warn!(error = %e, "Trigger rejected");
                OrchestrationOutcome::Rejected {
                    kind: e.kind(),
                    message: e.stage_error().to_string(),
                }
            }
        }
    }

    fn try_start(&self, trigger: &TriggerEvent) -> PipelineResult<RunState> {
        let (bucket, key) = trigger.bucket_and_key();
        let bucket = bucket
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| PipelineError::rejected(StageError::invalid_input("trigger has no bucket")))?;
        let key = key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::rejected(StageError::invalid_input("trigger has no object key")))?;

        let pipeline = &self.settings.pipeline;
        let targets = trigger
            .target_languages()
            .unwrap_or(pipeline.target_languages.as_slice());
        let work_item = WorkItem::new(bucket, key, targets, &pipeline.supported_languages, self.clock.now())
            .map_err(PipelineError::rejected)?;

        let ctx = self.context(&work_item);
        ctx.logger.info(&format!(
            "Run {} started for {} -> [{}]",
            work_item.run_id(),
            work_item.source(),
            work_item.target_languages().join(", ")
        ));

        let handle = self
            .submit_stage(&ctx, &self.transcription, &work_item, || {
                self.transcription.submit(&ctx, &work_item)
            })
            .map_err(PipelineError::rejected)?;

        Ok(RunState::Transcribing {
            work_item,
            handle,
            attempt: 0,
        })
    }

    /// Make one status check for the current stage and, when that stage has
    /// completed, submit the next one. Terminal states come back unchanged.
    pub fn advance(&self, state: RunState) -> RunState {
        if state.is_terminal() {
            return state;
        }
        let ctx = self.context(state.work_item());
        ctx.logger.section(&format!("{} status", state.stage()));

        let next = match state {
            RunState::Transcribing {
                work_item,
                handle,
                attempt,
            } => self.after_transcription(&ctx, work_item, handle, attempt + 1),
            RunState::Translating {
                work_item,
                entries,
                attempt,
            } => self.after_translation(&ctx, work_item, entries, attempt + 1),
            RunState::Synthesizing {
                work_item,
                entries,
                attempt,
            } => self.after_synthesis(&ctx, work_item, entries, attempt + 1),
            terminal => terminal,
        };

        if next.is_terminal() {
            self.log_outcome(&ctx, &next);
        }
        next
    }

    fn after_transcription(
        &self,
        ctx: &Context,
        work_item: WorkItem,
        handle: JobHandle,
        attempt: u32,
    ) -> RunState {
        let report = self.transcription.check_status(ctx, &work_item, &handle, attempt);
        match report.status {
            StageStatus::InProgress => RunState::Transcribing {
                work_item,
                handle,
                attempt,
            },
            StageStatus::Completed => {
                let Some(location) = report.entries.get(&handle.language).and_then(|r| r.location()).cloned()
                else {
                    return failed(work_item, StageKind::Transcription, "transcript location missing");
                };
                let source = TranscriptSource::Object(location);
                match self.submit_stage(ctx, &self.translation, &work_item, || {
                    self.translation.submit(ctx, &work_item, &source)
                }) {
                    Ok(submission) => RunState::Translating {
                        work_item,
                        entries: submission.entries,
                        attempt: 0,
                    },
                    Err(e) => failed(work_item, StageKind::Translation, e),
                }
            }
            StageStatus::PartiallyFailed | StageStatus::Failed => {
                let reason = report.failure_summary().unwrap_or_else(|| "transcription failed".into());
                failed(work_item, StageKind::Transcription, reason)
            }
        }
    }

    fn after_translation(
        &self,
        ctx: &Context,
        work_item: WorkItem,
        entries: AggregateStatus,
        attempt: u32,
    ) -> RunState {
        let report = self.translation.check_status(ctx, &work_item, &entries, attempt);
        match report.status {
            StageStatus::InProgress => RunState::Translating {
                work_item,
                entries,
                attempt,
            },
            StageStatus::Completed => {
                let submitted = self.submit_stage(ctx, &self.synthesis, &work_item, || {
                    let texts = self.translation.load_texts(ctx, &report.entries)?;
                    self.synthesis.submit(ctx, &work_item, &texts)
                });
                match submitted {
                    Ok(submission) => RunState::Synthesizing {
                        work_item,
                        entries: submission.entries,
                        attempt: 0,
                    },
                    Err(e) => failed(work_item, StageKind::Synthesis, e),
                }
            }
            StageStatus::PartiallyFailed => RunState::PartiallyFailed {
                work_item,
                stage: StageKind::Translation,
                entries: report.entries,
            },
            StageStatus::Failed => {
                let reason = report
                    .failure_summary()
                    .unwrap_or_else(|| format!("translations not found after {} checks", attempt));
                failed(work_item, StageKind::Translation, reason)
            }
        }
    }

    fn after_synthesis(
        &self,
        ctx: &Context,
        work_item: WorkItem,
        entries: AggregateStatus,
        attempt: u32,
    ) -> RunState {
        let report = self.synthesis.check_status(ctx, &entries, attempt);
        match report.status {
            StageStatus::InProgress => RunState::Synthesizing {
                work_item,
                entries,
                attempt,
            },
            StageStatus::Completed => RunState::Completed {
                work_item,
                audio: report.entries,
            },
            StageStatus::PartiallyFailed => RunState::PartiallyFailed {
                work_item,
                stage: StageKind::Synthesis,
                entries: report.entries,
            },
            StageStatus::Failed => {
                let reason = report
                    .failure_summary()
                    .unwrap_or_else(|| format!("audio not found after {} checks", attempt));
                failed(work_item, StageKind::Synthesis, reason)
            }
        }
    }

    pub fn submit_transcription(&self, work_item: &WorkItem) -> PipelineResult<JobHandle> {
        let ctx = self.context(work_item);
        self.submit_stage(&ctx, &self.transcription, work_item, || {
            self.transcription.submit(&ctx, work_item)
        })
        .map_err(|e| PipelineError::stage_failed(work_item.run_id(), StageKind::Transcription, e))
    }

    pub fn check_transcription(&self, work_item: &WorkItem, handle: &JobHandle, attempt: u32) -> StatusReport {
        let ctx = self.context(work_item);
        self.transcription.check_status(&ctx, work_item, handle, attempt)
    }

    pub fn submit_translation(
        &self,
        work_item: &WorkItem,
        source: &TranscriptSource,
    ) -> PipelineResult<TranslationSubmission> {
        let ctx = self.context(work_item);
        self.submit_stage(&ctx, &self.translation, work_item, || {
            self.translation.submit(&ctx, work_item, source)
        })
        .map_err(|e| PipelineError::stage_failed(work_item.run_id(), StageKind::Translation, e))
    }

    pub fn check_translation(
        &self,
        work_item: &WorkItem,
        entries: &AggregateStatus,
        attempt: u32,
    ) -> StatusReport {
        let ctx = self.context(work_item);
        self.translation.check_status(&ctx, work_item, entries, attempt)
    }

    /// Translated texts of the completed entries, for [`submit_synthesis`](Self::submit_synthesis).
    pub fn load_translations(
        &self,
        work_item: &WorkItem,
        entries: &AggregateStatus,
    ) -> PipelineResult<BTreeMap<LanguageCode, String>> {
        let ctx = self.context(work_item);
        self.translation
            .load_texts(&ctx, entries)
            .map_err(|e| PipelineError::stage_failed(work_item.run_id(), StageKind::Translation, e))
    }

    pub fn submit_synthesis(
        &self,
        work_item: &WorkItem,
        texts: &BTreeMap<LanguageCode, String>,
    ) -> PipelineResult<SynthesisSubmission> {
        let ctx = self.context(work_item);
        self.submit_stage(&ctx, &self.synthesis, work_item, || {
            self.synthesis.submit(&ctx, work_item, texts)
        })
        .map_err(|e| PipelineError::stage_failed(work_item.run_id(), StageKind::Synthesis, e))
    }

    pub fn check_synthesis(&self, work_item: &WorkItem, entries: &AggregateStatus, attempt: u32) -> StatusReport {
        let ctx = self.context(work_item);
        self.synthesis.check_status(&ctx, entries, attempt)
    }

    /// Log marker, precondition check, then the submit itself.
    fn submit_stage<T>(
        &self,
        ctx: &Context,
        stage: &dyn Stage,
        work_item: &WorkItem,
        submit: impl FnOnce() -> DriverResult<T>,
    ) -> DriverResult<T> {
        ctx.logger.stage(stage.name());
        ctx.logger.debug(&format!("Validating input for '{}'", stage.description()));

        let result = stage.validate_input(ctx, work_item).and_then(|()| submit());
        if let Err(e) = &result {
            ctx.logger.error(&format!("{} failed: {}", stage.name(), e));
            ctx.logger.show_tail(stage.name());
        }
        result
    }

    fn context(&self, work_item: &WorkItem) -> Context {
        Context::new(
            Arc::clone(&self.settings),
            Arc::new(self.run_logger(work_item)),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        )
    }

    fn run_logger(&self, work_item: &WorkItem) -> RunLogger {
        let config = self.settings.logging.to_log_config();
        let Some(dir) = &self.log_dir else {
            return RunLogger::detached(work_item.run_id(), config);
        };

        match RunLogger::builder(work_item.run_id())
            .log_dir(dir)
            .config(config.clone())
            .build()
        {
            Ok(logger) => logger,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot open run log file");
                RunLogger::detached(work_item.run_id(), config)
            }
        }
    }

    fn log_outcome(&self, ctx: &Context, state: &RunState) {
        match state {
            RunState::Completed { audio, .. } => {
                ctx.logger.success(&format!("Run finished with {} audio files", audio.len()))
            }
            RunState::PartiallyFailed { stage, entries, .. } => {
                let failed: Vec<&str> = entries
                    .iter()
                    .filter(|(_, r)| r.is_failed())
                    .map(|(l, _)| l.as_str())
                    .collect();
                ctx.logger.warn(&format!(
                    "Run ended partially failed at {}: [{}] failed",
                    stage,
                    failed.join(", ")
                ));
            }
            RunState::Failed { stage, reason, .. } => {
                ctx.logger.error(&format!("Run failed at {}: {}", stage, reason))
            }
            _ => {}
        }
    }
}

fn failed(work_item: WorkItem, stage: StageKind, reason: impl ToString) -> RunState {
    RunState::Failed {
        work_item,
        stage,
        reason: reason.to_string(),
    }
}
