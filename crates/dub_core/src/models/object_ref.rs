//! Structured reference to a blob in the object store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A URI that cannot be mapped to a key inside the expected bucket.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid object reference '{uri}': {reason}")]
pub struct InvalidReference {
    pub uri: String,
    pub reason: String,
}

impl InvalidReference {
    fn new(uri: &str, reason: impl Into<String>) -> Self {
        Self {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

/// Location of one object: a bucket and a key inside it.
///
/// Built once by the stage that produces the object and passed along as is,
/// so consumers never have to re-parse URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `s3://bucket/key` form.
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }

    /// Last path segment of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Resolve a URI produced by an engine into a reference inside `bucket`.
    ///
    /// Accepted forms:
    /// - `s3://bucket/key`
    /// - `https://s3.amazonaws.com/bucket/key`
    /// - `https://s3.<region>.amazonaws.com/bucket/key`
    pub fn parse_in_bucket(uri: &str, bucket: &str) -> Result<Self, InvalidReference> {
        let path = if let Some(rest) = uri.strip_prefix("s3://") {
            rest
        } else if let Some(rest) = uri
            .strip_prefix("https://")
            .or_else(|| uri.strip_prefix("http://"))
        {
            let (host, path) = rest
                .split_once('/')
                .ok_or_else(|| InvalidReference::new(uri, "missing path"))?;
            if !is_path_style_host(host) {
                return Err(InvalidReference::new(
                    uri,
                    format!("unsupported host '{}'", host),
                ));
            }
            path
        } else {
            return Err(InvalidReference::new(uri, "unsupported scheme"));
        };

        let (found_bucket, key) = path
            .split_once('/')
            .ok_or_else(|| InvalidReference::new(uri, "missing object key"))?;

        if found_bucket != bucket {
            return Err(InvalidReference::new(
                uri,
                format!("expected bucket '{}', found '{}'", bucket, found_bucket),
            ));
        }
        if key.is_empty() {
            return Err(InvalidReference::new(uri, "empty object key"));
        }

        Ok(Self::new(bucket, key))
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

fn is_path_style_host(host: &str) -> bool {
    host == "s3.amazonaws.com"
        || (host.starts_with("s3.") && host.ends_with(".amazonaws.com"))
        || (host.starts_with("s3-") && host.ends_with(".amazonaws.com"))
}
