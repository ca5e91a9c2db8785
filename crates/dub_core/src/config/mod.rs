//! Configuration for the dubbing pipeline.
//!
//! Settings live in a TOML file with one table per concern: `[pipeline]`,
//! `[voices]`, `[timeouts]`, `[polling]`, `[fan_out]` and `[logging]`.
//!
//! # Example
//!
//! ```no_run
//! use dub_core::config::{ConfigManager, ConfigSection};
//!
//! let mut config = ConfigManager::new(".config/dub.toml");
//! config.load_or_create().unwrap();
//!
//! println!("Targets: {:?}", config.settings().pipeline.target_languages);
//!
//! config.settings_mut().fan_out.parallel = false;
//! config.update_section(ConfigSection::FanOut).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, FanOutSettings, LoggingSettings, PipelineSettings, PollingSettings, Settings,
    TimeoutSettings, VoiceSettings,
};
