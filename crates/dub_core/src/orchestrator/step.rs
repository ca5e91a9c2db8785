//! Stage trait shared by the three drivers.

use super::errors::DriverResult;
use super::types::Context;
use crate::models::{StageKind, WorkItem};

/// Common surface of a stage driver.
///
/// Submit and status-check signatures differ per stage, so they live on the
/// concrete drivers. The orchestrator relies on this trait for the parts it
/// runs the same way every time: the log marker and the precondition check
/// made before any work is submitted.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Name used in log markers and error context.
    fn name(&self) -> &str;

    /// Check preconditions before anything is submitted.
    fn validate_input(&self, ctx: &Context, item: &WorkItem) -> DriverResult<()>;

    fn description(&self) -> &str {
        self.name()
    }
}
