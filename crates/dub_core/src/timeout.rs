//! Bounded blocking calls.
//!
//! Engine and store calls run on a helper thread; the caller waits on a
//! single-slot channel for at most the configured limit. A call that overruns
//! keeps running detached but its result is discarded.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use thiserror::Error;

/// Why a bounded call produced no value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAborted {
    /// No result within the limit.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The call panicked or its thread could not be started.
    #[error("call panicked")]
    Panicked,
}

/// Run `f` and wait at most `limit` for its result. A zero limit runs `f` on
/// the calling thread without any bound. A panic in `f` is reported as
/// [`CallAborted::Panicked`] either way.
pub fn call_with_timeout<T, F>(limit: Duration, f: F) -> Result<T, CallAborted>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if limit.is_zero() {
        return panic::catch_unwind(AssertUnwindSafe(f)).map_err(|_| CallAborted::Panicked);
    }

    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new()
        .name("bounded-call".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        });
    if spawned.is_err() {
        return Err(CallAborted::Panicked);
    }

    match rx.recv_timeout(limit) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(CallAborted::TimedOut(limit)),
        Err(RecvTimeoutError::Disconnected) => Err(CallAborted::Panicked),
    }
}
