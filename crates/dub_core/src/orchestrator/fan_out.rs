//! Per-language fan-out.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::models::{AggregateStatus, LanguageCode, StageResult};

/// Run `task` once per language and collect the results.
///
/// With `parallel` every language gets its own scoped thread; otherwise the
/// languages run one after another. Either way a panicking unit becomes
/// `Failed` for that language only, and every unit has finished before this
/// returns.
pub(crate) fn run_per_language<F>(languages: &[LanguageCode], parallel: bool, task: F) -> AggregateStatus
where
    F: Fn(&str) -> StageResult + Sync,
{
    let results: Vec<StageResult> = if parallel && languages.len() > 1 {
        thread::scope(|scope| {
            let handles: Vec<_> = languages
                .iter()
                .map(|lang| {
                    let task = &task;
                    scope.spawn(move || task(lang))
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|_| panicked()))
                .collect()
        })
    } else {
        languages
            .iter()
            .map(|lang| panic::catch_unwind(AssertUnwindSafe(|| task(lang))).unwrap_or_else(|_| panicked()))
            .collect()
    };

    languages.iter().cloned().zip(results).collect()
}

fn panicked() -> StageResult {
    StageResult::failed("unit panicked")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectRef;

    fn langs() -> Vec<LanguageCode> {
        vec!["es".into(), "fr".into(), "de".into()]
    }

    fn task(lang: &str) -> StageResult {
        if lang == "fr" {
            panic!("boom");
        }
        StageResult::Completed(ObjectRef::new("media", lang))
    }

    #[test]
    fn panic_fails_only_that_language() {
        for parallel in [true, false] {
            let agg = run_per_language(&langs(), parallel, task);
            assert_eq!(agg.len(), 3);
            assert!(agg.get("es").unwrap().is_completed());
            assert!(agg.get("de").unwrap().is_completed());
            assert_eq!(agg.get("fr"), Some(&StageResult::failed("unit panicked")));
        }
    }

    #[test]
    fn empty_language_list_yields_empty_aggregate() {
        let agg = run_per_language(&[], true, task);
        assert!(agg.is_empty());
    }
}
