//! Job handles, per-unit results and their aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{StageKind, StageStatus};
use super::object_ref::ObjectRef;

/// Everything needed to poll an in-flight engine job later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub stage: StageKind,
    pub job_name: String,
    /// Identifier assigned by the engine.
    pub job_id: String,
    pub language: String,
    pub submitted_at: DateTime<Utc>,
    /// Where the engine was asked to write its output.
    pub output: ObjectRef,
}

/// Outcome of one fan-out unit (or of the single transcription job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageResult {
    Pending,
    Completed(ObjectRef),
    Failed(String),
}

impl StageResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        StageResult::Failed(reason.into())
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StageResult::Completed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageResult::Failed(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StageResult::Pending)
    }

    pub fn location(&self) -> Option<&ObjectRef> {
        match self {
            StageResult::Completed(location) => Some(location),
            _ => None,
        }
    }
}

/// Per-language results of a fan-out stage.
///
/// The overall status is derived on every call to [`AggregateStatus::overall`]
/// and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateStatus {
    entries: BTreeMap<String, StageResult>,
}

impl AggregateStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, language: impl Into<String>, result: StageResult) {
        self.entries.insert(language.into(), result);
    }

    pub fn get(&self, language: &str) -> Option<&StageResult> {
        self.entries.get(language)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StageResult)> {
        self.entries.iter()
    }

    /// `Completed` iff every entry completed, `Failed` iff there are no
    /// entries, `InProgress` otherwise.
    pub fn overall(&self) -> StageStatus {
        if self.entries.is_empty() {
            StageStatus::Failed
        } else if self.entries.values().all(StageResult::is_completed) {
            StageStatus::Completed
        } else {
            StageStatus::InProgress
        }
    }

    /// No entry is still pending.
    pub fn is_settled(&self) -> bool {
        !self.entries.values().any(StageResult::is_pending)
    }

    pub fn has_failures(&self) -> bool {
        self.entries.values().any(StageResult::is_failed)
    }

    /// Languages whose unit completed, with their output locations.
    pub fn completed_locations(&self) -> BTreeMap<String, ObjectRef> {
        self.entries
            .iter()
            .filter_map(|(lang, result)| result.location().map(|l| (lang.clone(), l.clone())))
            .collect()
    }
}

impl FromIterator<(String, StageResult)> for AggregateStatus {
    fn from_iter<I: IntoIterator<Item = (String, StageResult)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn done(lang: &str) -> StageResult {
        StageResult::Completed(ObjectRef::new("media", format!("translations/{}.txt", lang)))
    }

    #[test]
    fn empty_aggregate_is_failed() {
        assert_eq!(AggregateStatus::new().overall(), StageStatus::Failed);
    }

    #[test]
    fn completed_only_when_every_entry_completed() {
        let mut agg = AggregateStatus::new();
        agg.insert("es", done("es"));
        agg.insert("fr", done("fr"));
        assert_eq!(agg.overall(), StageStatus::Completed);

        agg.insert("de", StageResult::Pending);
        assert_eq!(agg.overall(), StageStatus::InProgress);

        agg.insert("de", StageResult::failed("engine rejected"));
        assert_eq!(agg.overall(), StageStatus::InProgress);
        assert!(agg.is_settled());
        assert!(agg.has_failures());
    }

    #[test]
    fn completed_locations_skip_failures() {
        let mut agg = AggregateStatus::new();
        agg.insert("es", done("es"));
        agg.insert("fr", StageResult::failed("boom"));
        let locations = agg.completed_locations();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations["es"].key, "translations/es.txt");
    }

    #[test]
    fn result_serializes_tagged() {
        let json = serde_json::to_value(StageResult::failed("x")).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["detail"], "x");

        let agg: AggregateStatus = [("es".to_string(), StageResult::Pending)]
            .into_iter()
            .collect();
        let back: AggregateStatus =
            serde_json::from_str(&serde_json::to_string(&agg).unwrap()).unwrap();
        assert_eq!(back, agg);
    }
}
