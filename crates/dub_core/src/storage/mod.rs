//! Object store abstraction.
//!
//! The object store is the only hand-off medium between stages. Drivers see it
//! through the [`ObjectStore`] trait so runs can target an in-memory store in
//! tests, a directory tree on a workstation, or a cloud bucket behind an
//! adapter outside this crate.

mod local;
mod memory;
mod timed;

use std::io;
use std::time::Duration;

use thiserror::Error;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use timed::TimedStore;

/// Errors returned by object store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object under this key.
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The backend refused or failed the call.
    #[error("Store backend error: {0}")]
    Backend(String),

    /// The call exceeded `timeouts.store_ms`.
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    /// Filesystem error from the local backend.
    #[error("Store I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Minimal blob store: existence check, read, write.
pub trait ObjectStore: Send + Sync {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Read a whole object. A missing key yields [`StoreError::NotFound`].
    fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>>;

    /// Create or replace an object.
    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Read an object as UTF-8 text.
    fn get_text(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let bytes = self.get(bucket, key)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Backend(format!("s3://{}/{} is not UTF-8: {}", bucket, key, e)))
    }
}
