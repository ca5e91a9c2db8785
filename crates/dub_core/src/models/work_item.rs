//! The unit of work carried through every stage of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::object_ref::ObjectRef;

/// Target language code as understood by the translation engine (`es`, `fr`).
pub type LanguageCode = String;

/// Reasons a trigger cannot become a [`WorkItem`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidWorkItem {
    #[error("Missing bucket")]
    MissingBucket,

    #[error("Missing object key")]
    MissingKey,

    #[error("No target languages requested")]
    NoTargetLanguages,

    #[error("Unsupported target language '{0}'")]
    UnsupportedLanguage(String),
}

/// Identity of one pipeline run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    run_id: Uuid,
    bucket: String,
    original_filename: String,
    key: String,
    target_languages: Vec<LanguageCode>,
    created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Validate a trigger and build a work item with a fresh run id.
    ///
    /// Languages keep their first-seen order; duplicates are dropped.
    pub fn new(
        bucket: &str,
        key: &str,
        target_languages: &[LanguageCode],
        supported: &[LanguageCode],
        created_at: DateTime<Utc>,
    ) -> Result<Self, InvalidWorkItem> {
        Self::with_run_id(
            Uuid::new_v4(),
            bucket,
            key,
            target_languages,
            supported,
            created_at,
        )
    }

    pub fn with_run_id(
        run_id: Uuid,
        bucket: &str,
        key: &str,
        target_languages: &[LanguageCode],
        supported: &[LanguageCode],
        created_at: DateTime<Utc>,
    ) -> Result<Self, InvalidWorkItem> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(InvalidWorkItem::MissingBucket);
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(InvalidWorkItem::MissingKey);
        }

        let mut languages: Vec<LanguageCode> = Vec::with_capacity(target_languages.len());
        for lang in target_languages {
            let lang = lang.trim();
            if lang.is_empty() || languages.iter().any(|l| l == lang) {
                continue;
            }
            if !supported.iter().any(|s| s == lang) {
                return Err(InvalidWorkItem::UnsupportedLanguage(lang.to_string()));
            }
            languages.push(lang.to_string());
        }
        if languages.is_empty() {
            return Err(InvalidWorkItem::NoTargetLanguages);
        }

        let original_filename = key.rsplit('/').next().unwrap_or(key).to_string();

        Ok(Self {
            run_id,
            bucket: bucket.to_string(),
            original_filename,
            key: key.to_string(),
            target_languages: languages,
            created_at,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn target_languages(&self) -> &[LanguageCode] {
        &self.target_languages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Reference to the uploaded source recording.
    pub fn source(&self) -> ObjectRef {
        ObjectRef::new(&self.bucket, &self.key)
    }

    /// Reference to another object in the same bucket.
    pub fn object(&self, key: impl Into<String>) -> ObjectRef {
        ObjectRef::new(&self.bucket, key)
    }
}
