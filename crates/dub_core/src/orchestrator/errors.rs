//! Error types for the orchestrator.
//!
//! Errors carry context that chains through layers:
//! Run → Stage → Operation → Detail

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InvalidReference, InvalidWorkItem, StageKind};
use crate::storage::StoreError;

/// Coarse error taxonomy reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed trigger, work item or object reference.
    InputError,
    /// A required object is missing from the store.
    NotFound,
    /// An engine refused, failed or timed out.
    EngineError,
    /// Settings the stage cannot run with, such as a missing voice.
    InvalidConfiguration,
    /// Store failures and anything else not covered above.
    UnexpectedError,
}

/// Whole-stage failure. Per-language failures never surface as this type;
/// they are recorded as `StageResult::Failed` instead.
#[derive(Error, Debug)]
pub enum StageError {
    /// The trigger, work item or stage input is unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A required object is missing.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// A URI that does not name an object in the run's bucket.
    #[error(transparent)]
    InvalidReference(#[from] InvalidReference),

    /// A whole-stage engine call (the transcription submit) failed.
    #[error("{engine} engine error: {message}")]
    Engine { engine: String, message: String },

    /// Settings the stage cannot run with.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Store failure other than a missing object.
    #[error("Storage error during {operation}: {source}")]
    Storage {
        operation: String,
        #[source]
        source: StoreError,
    },

    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl StageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn not_found(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn engine(engine: impl Into<String>, error: impl Display) -> Self {
        Self::Engine {
            engine: engine.into(),
            message: error.to_string(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Wrap a store error; a missing object becomes [`StageError::NotFound`].
    pub fn storage(operation: impl Into<String>, source: StoreError) -> Self {
        match source {
            StoreError::NotFound { bucket, key } => Self::NotFound { bucket, key },
            source => Self::Storage {
                operation: operation.into(),
                source,
            },
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::InvalidInput(_) | StageError::InvalidReference(_) => ErrorKind::InputError,
            StageError::NotFound { .. } => ErrorKind::NotFound,
            StageError::Engine { .. } => ErrorKind::EngineError,
            StageError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            StageError::Storage { .. } | StageError::Unexpected(_) => ErrorKind::UnexpectedError,
        }
    }
}

impl From<InvalidWorkItem> for StageError {
    fn from(err: InvalidWorkItem) -> Self {
        StageError::InvalidInput(err.to_string())
    }
}

/// Stage failure with run context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The trigger could not start a run.
    #[error("Trigger rejected: {source}")]
    Rejected {
        #[source]
        source: StageError,
    },

    /// A stage entry point failed for an existing run.
    #[error("Run {run_id} failed at {stage}: {source}")]
    StageFailed {
        run_id: Uuid,
        stage: StageKind,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    pub fn rejected(source: impl Into<StageError>) -> Self {
        Self::Rejected {
            source: source.into(),
        }
    }

    pub fn stage_failed(run_id: Uuid, stage: StageKind, source: StageError) -> Self {
        Self::StageFailed {
            run_id,
            stage,
            source,
        }
    }

    pub fn stage_error(&self) -> &StageError {
        match self {
            PipelineError::Rejected { source } | PipelineError::StageFailed { source, .. } => source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.stage_error().kind()
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, StageError>;

/// Result type for orchestrator operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
