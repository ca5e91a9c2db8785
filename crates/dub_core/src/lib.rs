//! Dub Core - speech dubbing pipeline
//!
//! Drives one uploaded recording through speech-to-text, machine translation
//! and text-to-speech. Every stage hands its payload to the next one through
//! an object store, and every stage exposes a `submit` and a `check_status`
//! entry point that an external scheduler re-invokes until the run is
//! terminal.

pub mod clock;
pub mod config;
pub mod engines;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod storage;
pub mod timeout;

pub use orchestrator::{Orchestrator, OrchestrationOutcome, RunState};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
