//! Filesystem-backed object store.
//!
//! Each bucket is a directory under the root and each key a relative path
//! inside it. Writes land in a temp file first and are renamed into place, so
//! a reader never observes a half-written object.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use super::{ObjectStore, StoreError, StoreResult};

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let mut path = self.root.join(checked_segment(bucket)?);
        for part in Path::new(key).components() {
            match part {
                Component::Normal(segment) => path.push(segment),
                _ => {
                    return Err(StoreError::Backend(format!(
                        "key '{}' escapes its bucket",
                        key
                    )))
                }
            }
        }
        Ok(path)
    }
}

fn checked_segment(bucket: &str) -> StoreResult<&str> {
    if bucket.is_empty() || bucket.contains('/') || bucket == "." || bucket == ".." {
        return Err(StoreError::Backend(format!("invalid bucket name '{}'", bucket)));
    }
    Ok(bucket)
}

impl ObjectStore for LocalObjectStore {
    fn exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn get(&self, bucket: &str, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(bucket, key)),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".part");
        let temp_path = path.with_file_name(temp_name);

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &path)?;
        Ok(())
    }
}
