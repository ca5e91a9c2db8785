//! Contracts of the external speech, translation and voice engines.
//!
//! The pipeline never talks to a vendor SDK directly. Each engine is a trait
//! object held behind an `Arc`, so a deployment plugs in its cloud adapters and
//! tests plug in the scripted mocks from [`mock`].

pub mod mock;
mod speech_to_text;
mod text_to_speech;
mod translation;

use std::time::Duration;

use thiserror::Error;

use crate::timeout::CallAborted;

pub use speech_to_text::{EngineJobState, SpeechToTextEngine, TranscriptionJob, TranscriptionRequest};
pub use text_to_speech::TextToSpeechEngine;
pub use translation::TranslationEngine;

/// Errors surfaced by an engine call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused the request (bad input, unsupported language).
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The engine could not be reached or failed internally.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown job id '{0}'")]
    JobNotFound(String),
}

impl From<CallAborted> for EngineError {
    fn from(aborted: CallAborted) -> Self {
        match aborted {
            CallAborted::TimedOut(limit) => EngineError::Timeout(limit),
            CallAborted::Panicked => EngineError::Unavailable("engine call panicked".into()),
        }
    }
}

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Run one engine call under `limit`; overruns and panics become engine errors.
pub fn bounded<T, F>(limit: Duration, call: F) -> EngineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> EngineResult<T> + Send + 'static,
{
    crate::timeout::call_with_timeout(limit, call)
        .map_err(EngineError::from)
        .and_then(|result| result)
}
