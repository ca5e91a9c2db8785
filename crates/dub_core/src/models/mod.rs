//! Data models for the dubbing pipeline.
//!
//! This module contains the data shared by every stage:
//! - Enums for stage kinds and stage-level status
//! - The `WorkItem` identifying one run
//! - Job handles, per-unit results and their aggregate
//! - Structured object references and deterministic output keys

mod enums;
mod jobs;
pub mod keys;
mod object_ref;
mod work_item;

pub use enums::{StageKind, StageStatus};
pub use jobs::{AggregateStatus, JobHandle, StageResult};
pub use keys::{KeyBuilder, KeyScheme};
pub use object_ref::{InvalidReference, ObjectRef};
pub use work_item::{InvalidWorkItem, LanguageCode, WorkItem};
