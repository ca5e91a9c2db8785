//! Core types shared by the stage drivers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::Settings;
use crate::logging::RunLogger;
use crate::models::{
    AggregateStatus, KeyBuilder, LanguageCode, ObjectRef, StageKind, StageResult, StageStatus,
    WorkItem,
};
use crate::storage::ObjectStore;

/// Read-only context for one stage invocation.
///
/// Holds configuration and shared resources. Anything that must survive to
/// the next invocation goes into the returned report or `RunState` instead.
pub struct Context {
    pub settings: Arc<Settings>,
    pub logger: Arc<RunLogger>,
    pub store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
}

impl Context {
    pub fn new(
        settings: Arc<Settings>,
        logger: Arc<RunLogger>,
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            logger,
            store,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Key builder stamped with the current instant and the configured scheme.
    pub fn keys(&self, item: &WorkItem) -> KeyBuilder {
        self.keys_at(item, self.now())
    }

    pub fn keys_at(&self, item: &WorkItem, at: DateTime<Utc>) -> KeyBuilder {
        KeyBuilder::new(item.original_filename(), at)
            .with_scheme(self.settings.pipeline.key_scheme, item.run_id())
    }
}

/// Result of one status check, handed back to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub stage: StageKind,
    pub status: StageStatus,
    pub entries: AggregateStatus,
    /// Number of checks made so far, this one included.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reasons of failed entries, joined for a one-line summary.
    pub fn failure_summary(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        let reasons: Vec<String> = self
            .entries
            .iter()
            .filter_map(|(lang, result)| match result {
                StageResult::Failed(reason) => Some(format!("{}: {}", lang, reason)),
                _ => None,
            })
            .collect();
        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join("; "))
        }
    }
}

/// Where the translation stage finds its transcript.
///
/// Serialized untagged, so a scheduler may pass either `{"bucket", "key"}`
/// or a plain URI string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptSource {
    Object(ObjectRef),
    Uri(String),
}

/// Per-language outcome of a fan-out submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutSubmission {
    pub stage: StageKind,
    pub entries: AggregateStatus,
    /// Languages not attempted because they had nothing to process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<LanguageCode>,
}

impl FanOutSubmission {
    pub fn overall(&self) -> StageStatus {
        self.entries.overall()
    }
}

pub type TranslationSubmission = FanOutSubmission;
pub type SynthesisSubmission = FanOutSubmission;
