//! Core traits and types for the cache store.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::Result;
use crate::network::Response;

/// Name of one deployment's cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheVersion(String);

impl CacheVersion {
  pub fn new(version: impl Into<String>) -> Self {
    Self(version.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CacheVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for CacheVersion {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl From<String> for CacheVersion {
  fn from(s: String) -> Self {
    Self(s)
  }
}

/// Lookup key of a stored response: request method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.as_str().to_string(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 of the key for stable, fixed-length row keys.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Storage backend for versioned cache buckets.
///
/// Buckets are created and deleted whole. Entries inside a bucket are written
/// whole and overwritten by key; readers never observe a partial entry.
pub trait CacheStore: Send + Sync + 'static {
  /// Create the bucket if it does not exist yet.
  fn open(&self, bucket: &CacheVersion) -> Result<()>;

  fn has(&self, bucket: &CacheVersion) -> Result<bool>;

  /// Names of every bucket in the store, oldest first.
  fn keys(&self) -> Result<Vec<CacheVersion>>;

  /// Delete a bucket and all of its entries. Returns false if it did not exist.
  fn delete(&self, bucket: &CacheVersion) -> Result<bool>;

  /// Look up a stored response. A missing bucket is a miss, not an error.
  fn lookup(&self, bucket: &CacheVersion, key: &RequestKey) -> Result<Option<Response>>;

  /// Store (or overwrite) one response.
  fn put(&self, bucket: &CacheVersion, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several responses in one all-or-nothing write.
  fn put_all(&self, bucket: &CacheVersion, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Number of entries in a bucket (0 if it does not exist).
  fn len(&self, bucket: &CacheVersion) -> Result<usize>;

  /// Attach a note to an existing bucket (the descriptor it was built from).
  fn annotate(&self, bucket: &CacheVersion, note: &str) -> Result<()>;

  /// The note attached to a bucket, if any.
  fn annotation(&self, bucket: &CacheVersion) -> Result<Option<String>>;
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Served from the active bucket (possibly stale, refresh in flight)
  Cache,
  /// Fetched from the network on a cache miss
  Network,
  /// Network failed on a navigation; the offline document was served
  OfflineFallback,
  /// Not intercepted (cross-origin, non-HTTP, or no active controller)
  Passthrough,
}

impl fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Cache => write!(f, "cache"),
      Self::Network => write!(f, "network"),
      Self::OfflineFallback => write!(f, "offline"),
      Self::Passthrough => write!(f, "passthrough"),
    }
  }
}
