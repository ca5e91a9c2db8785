//! Store decorator that bounds every call.

use std::sync::Arc;
use std::time::Duration;

use crate::timeout::{call_with_timeout, CallAborted};

use super::{ObjectStore, StoreError, StoreResult};

/// Wraps another store and fails any call that exceeds `limit` with
/// [`StoreError::Timeout`].
pub struct TimedStore {
    inner: Arc<dyn ObjectStore>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn ObjectStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    fn bounded<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ObjectStore) -> StoreResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match call_with_timeout(self.limit, move || f(inner.as_ref())) {
            Ok(result) => result,
            Err(CallAborted::TimedOut(limit)) => Err(StoreError::Timeout(limit)),
            Err(CallAborted::Panicked) => Err(StoreError::Backend("store call panicked".into())),
        }
    }
}

impl ObjectStore for TimedStore {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let (bucket, key) = (bucket.to_string(), key.to_string());
        self.bounded(move |store| store.exists(&bucket, &key))
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let (bucket, key) = (bucket.to_string(), key.to_string());
        self.bounded(move |store| store.get(&bucket, &key))
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let (bucket, key, bytes) = (bucket.to_string(), key.to_string(), bytes.to_vec());
        self.bounded(move |store| store.put(&bucket, &key, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use std::thread;

    struct SlowStore;

    impl ObjectStore for SlowStore {
        fn exists(&self, _: &str, _: &str) -> StoreResult<bool> {
            thread::sleep(Duration::from_millis(500));
            Ok(true)
        }
        fn get(&self, _: &str, _: &str) -> StoreResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn put(&self, _: &str, _: &str, _: &[u8]) -> StoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn passes_through_fast_calls() {
        let inner = Arc::new(MemoryObjectStore::new().with_object("b", "k", b"v".to_vec()));
        let store = TimedStore::new(inner, Duration::from_secs(5));
        assert_eq!(store.get("b", "k").unwrap(), b"v");
        assert!(store.get("b", "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn slow_call_becomes_timeout() {
        let store = TimedStore::new(Arc::new(SlowStore), Duration::from_millis(20));
        assert!(matches!(store.exists("b", "k"), Err(StoreError::Timeout(_))));
    }
}
