//! Status aggregation for the fan-out stages.

use crate::models::{AggregateStatus, ObjectRef, StageResult, StageStatus};
use crate::storage::ObjectStore;

/// Turns an aggregate into a stage status, settling it once waiting longer
/// cannot change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Checks allowed before pending entries are given up on.
    pub check_budget: u32,
}

impl StatusPolicy {
    pub fn new(check_budget: u32) -> Self {
        Self { check_budget }
    }

    /// `attempt` counts checks made so far, this one included.
    ///
    /// - every entry completed: `Completed`
    /// - no entries: `Failed`
    /// - nothing pending, or budget spent, with at least one completed
    ///   entry: `PartiallyFailed`
    /// - nothing pending, or budget spent, with no completed entry: `Failed`
    /// - otherwise `InProgress`
    ///
    /// Entries still pending once the budget is spent count as failed.
    pub fn resolve(&self, entries: &AggregateStatus, attempt: u32) -> StageStatus {
        match entries.overall() {
            StageStatus::InProgress => {}
            settled => return settled,
        }

        let exhausted = attempt >= self.check_budget;
        if !entries.is_settled() && !exhausted {
            return StageStatus::InProgress;
        }

        if entries.iter().any(|(_, r)| r.is_completed()) {
            StageStatus::PartiallyFailed
        } else {
            StageStatus::Failed
        }
    }
}

/// Re-check a recorded result against the store.
///
/// A completed entry stays completed only while its object exists; a missing
/// object is pending again and any other store error fails the entry.
/// Failed entries stay failed.
pub(crate) fn reverify(store: &dyn ObjectStore, recorded: Option<&StageResult>) -> StageResult {
    match recorded {
        Some(StageResult::Completed(location)) => check_exists(store, location),
        Some(StageResult::Failed(reason)) => StageResult::Failed(reason.clone()),
        Some(StageResult::Pending) | None => StageResult::Pending,
    }
}

fn check_exists(store: &dyn ObjectStore, location: &ObjectRef) -> StageResult {
    match store.exists(&location.bucket, &location.key) {
        Ok(true) => StageResult::Completed(location.clone()),
        Ok(false) => StageResult::Pending,
        Err(e) if e.is_not_found() => StageResult::Pending,
        Err(e) => StageResult::failed(format!("cannot verify {}: {}", location, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    fn done(key: &str) -> StageResult {
        StageResult::Completed(ObjectRef::new("media", key))
    }

    fn agg(entries: &[(&str, StageResult)]) -> AggregateStatus {
        entries
            .iter()
            .map(|(l, r)| (l.to_string(), r.clone()))
            .collect()
    }

    #[test]
    fn completed_and_empty_are_immediate() {
        let policy = StatusPolicy::new(3);
        assert_eq!(policy.resolve(&agg(&[("es", done("a"))]), 1), StageStatus::Completed);
        assert_eq!(policy.resolve(&AggregateStatus::new(), 1), StageStatus::Failed);
    }

    #[test]
    fn pending_waits_until_budget() {
        let policy = StatusPolicy::new(3);
        let entries = agg(&[("es", done("a")), ("fr", StageResult::Pending)]);
        assert_eq!(policy.resolve(&entries, 1), StageStatus::InProgress);
        assert_eq!(policy.resolve(&entries, 2), StageStatus::InProgress);
        assert_eq!(policy.resolve(&entries, 3), StageStatus::PartiallyFailed);

        let nothing_done = agg(&[("es", StageResult::Pending), ("fr", StageResult::Pending)]);
        assert_eq!(policy.resolve(&nothing_done, 3), StageStatus::Failed);
    }

    #[test]
    fn abandoned_pending_settles_like_failure() {
        let policy = StatusPolicy::new(2);
        let pending = agg(&[("es", done("a")), ("fr", StageResult::Pending)]);
        let failed = agg(&[("es", done("a")), ("fr", StageResult::failed("x"))]);
        assert_eq!(policy.resolve(&pending, 2), policy.resolve(&failed, 2));
    }

    #[test]
    fn settled_failure_is_partial() {
        let policy = StatusPolicy::new(10);
        let entries = agg(&[("es", done("a")), ("fr", StageResult::failed("x"))]);
        assert_eq!(policy.resolve(&entries, 1), StageStatus::PartiallyFailed);

        let all_failed = agg(&[("fr", StageResult::failed("x"))]);
        assert_eq!(policy.resolve(&all_failed, 1), StageStatus::Failed);
    }

    #[test]
    fn exhausted_with_pending_and_failure_is_partial() {
        let policy = StatusPolicy::new(2);
        let entries = agg(&[
            ("es", done("a")),
            ("fr", StageResult::failed("x")),
            ("de", StageResult::Pending),
        ]);
        assert_eq!(policy.resolve(&entries, 1), StageStatus::InProgress);
        assert_eq!(policy.resolve(&entries, 2), StageStatus::PartiallyFailed);
    }

    #[test]
    fn reverify_tracks_store() {
        let store = MemoryObjectStore::new().with_object("media", "a", b"x".to_vec());
        assert_eq!(reverify(&store, Some(&done("a"))), done("a"));
        assert_eq!(reverify(&store, Some(&done("gone"))), StageResult::Pending);
        assert_eq!(reverify(&store, None), StageResult::Pending);
        assert_eq!(
            reverify(&store, Some(&StageResult::failed("x"))),
            StageResult::failed("x")
        );

        store.break_prefix("a");
        assert!(reverify(&store, Some(&done("a"))).is_failed());
    }
}
