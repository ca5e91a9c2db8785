//! Stage drivers.
//!
//! Each driver submits work for one stage and later reports on it. Drivers
//! never wait for an engine job to finish; the scheduler calls back.

mod synthesis;
mod transcription;
mod translation;

pub use synthesis::SynthesisDriver;
pub use transcription::TranscriptionDriver;
pub use translation::TranslationDriver;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::clock::SteppingClock;
    use crate::config::Settings;
    use crate::logging::{LogConfig, RunLogger};
    use crate::models::WorkItem;
    use crate::orchestrator::Context;
    use crate::storage::ObjectStore;

    pub fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.logging.show_timestamps = false;
        settings
    }

    pub fn context(store: Arc<dyn ObjectStore>, settings: Settings) -> Context {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Context::new(
            Arc::new(settings),
            Arc::new(RunLogger::detached(uuid::Uuid::nil(), LogConfig::default())),
            store,
            Arc::new(SteppingClock::new(start, Duration::milliseconds(1))),
        )
    }

    pub fn work_item(targets: &[&str]) -> WorkItem {
        let langs: Vec<String> = targets.iter().map(|s| s.to_string()).collect();
        WorkItem::new(
            "media",
            "audio_inputs/talk.mp3",
            &langs,
            &Settings::default().pipeline.supported_languages,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
        .unwrap()
    }
}
