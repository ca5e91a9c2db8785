//! In-process object store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{ObjectStore, StoreError, StoreResult};

/// Objects kept in a map keyed by `(bucket, key)`.
///
/// Individual keys can be made to fail, which lets tests exercise the
/// "store error other than not-found" branches of the drivers.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    broken: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object.
    pub fn with_object(self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), bytes.into());
        self
    }

    /// Every operation on keys starting with `prefix` fails with a backend error.
    pub fn break_prefix(&self, prefix: &str) {
        self.broken.lock().push(prefix.to_string());
    }

    pub fn remove(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some()
    }

    /// Keys stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn check_broken(&self, key: &str) -> StoreResult<()> {
        if self.broken.lock().iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::Backend(format!("access denied for {}", key)));
        }
        Ok(())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        self.check_broken(key)?;
        Ok(self
            .objects
            .lock()
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        self.check_broken(key)?;
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.check_broken(key)?;
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }
}
