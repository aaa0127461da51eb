//! Error types for the pnv library.

use thiserror::Error;

use crate::lifecycle::InstanceState;

/// Errors raised by the cache store, the controller and the network layer.
#[derive(Error, Debug)]
pub enum Error {
  /// The network could not produce a response for a request.
  #[error("Network request to {url} failed: {reason}")]
  Network { url: String, reason: String },

  /// Cache storage failure that is not a SQLite error (lock poisoning, missing bucket, ...).
  #[error("Cache storage error: {0}")]
  Storage(String),

  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),

  /// An asset listed in the install manifest could not be cached.
  #[error("Install of {version} failed at {url}: {reason}")]
  Install {
    version: String,
    url: String,
    reason: String,
  },

  #[error("Invalid lifecycle transition from {from} to {to}")]
  InvalidTransition {
    from: InstanceState,
    to: InstanceState,
  },

  #[error("No active controller")]
  NoActiveController,

  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  /// Create a network error for the given URL.
  pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::Network {
      url: url.into(),
      reason: reason.into(),
    }
  }

  /// Create a storage error from any displayable cause.
  pub fn storage(reason: impl std::fmt::Display) -> Self {
    Self::Storage(reason.to_string())
  }

  /// Whether the failure came from the network rather than local state.
  pub fn is_network(&self) -> bool {
    matches!(self, Self::Network { .. })
  }
}

/// A specialized `Result` type for pnv operations.
pub type Result<T> = std::result::Result<T, Error>;
