//! Run orchestrator for the dubbing pipeline.
//!
//! Each run moves a recording through three stages. Every stage is split
//! into a submit and a status check so no call ever waits on an engine:
//!
//! ```text
//! Orchestrator
//!     ├── Stage: Transcription  (one engine job per run)
//!     ├── Stage: Translation    (one unit per target language)
//!     └── Stage: Synthesis      (one unit per translated language)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dub_core::orchestrator::{Orchestrator, OrchestrationOutcome, TriggerEvent};
//!
//! let orchestrator = Orchestrator::new(settings, store, stt, translator, tts)?;
//! let OrchestrationOutcome::Started { mut state } =
//!     orchestrator.start(&TriggerEvent::direct("media", "audio_inputs/talk.mp3"))
//! else {
//!     return;
//! };
//! while !state.is_terminal() {
//!     std::thread::sleep(poll_interval);
//!     state = orchestrator.advance(state);
//! }
//! ```

pub(crate) mod aggregate;
mod errors;
pub(crate) mod fan_out;
mod pipeline;
pub mod stages;
mod step;
mod types;

pub use aggregate::StatusPolicy;
pub use errors::{DriverResult, ErrorKind, PipelineError, PipelineResult, StageError};
pub use pipeline::{
    NamedBucket, NamedObject, NotificationEntity, NotificationRecord, OrchestrationOutcome,
    Orchestrator, RunState, TriggerEvent,
};
pub use stages::{SynthesisDriver, TranscriptionDriver, TranslationDriver};
pub use step::Stage;
pub use types::{
    Context, FanOutSubmission, StatusReport, SynthesisSubmission, TranscriptSource,
    TranslationSubmission,
};
