//! Per-request serving policy: stale-while-revalidate over the active bucket.

use std::sync::Arc;

use reqwest::Method;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheStore, CacheVersion, RequestKey, ResponseSource};
use crate::error::Result;
use crate::network::{Network, Request, Response};

/// The bucket requests are served from, plus its offline document.
#[derive(Debug, Clone)]
pub struct ActiveBucket {
  pub version: CacheVersion,
  pub offline_document: Url,
}

/// Handle to a background cache refresh.
///
/// Dropping the handle detaches the task; its result is discarded either way.
#[derive(Debug)]
pub struct RefreshHandle {
  task: JoinHandle<()>,
}

impl RefreshHandle {
  /// Abort the refresh if it has not finished yet.
  pub fn cancel(&self) {
    self.task.abort();
  }

  pub fn is_finished(&self) -> bool {
    self.task.is_finished()
  }

  /// Wait until the refresh has finished (or was cancelled).
  pub async fn finished(self) {
    let _ = self.task.await;
  }
}

/// A served response and where it came from.
#[derive(Debug)]
pub struct FetchOutcome {
  pub response: Response,
  pub source: ResponseSource,
  /// Set when a cached response was served and a refresh is in flight
  pub refresh: Option<RefreshHandle>,
}

impl FetchOutcome {
  pub fn new(response: Response, source: ResponseSource) -> Self {
    Self {
      response,
      source,
      refresh: None,
    }
  }
}

/// Fetch interceptor that serves same-origin requests from the active bucket.
pub struct FetchInterceptor<S: CacheStore, N: Network> {
  store: Arc<S>,
  network: Arc<N>,
  origin: Url,
}

impl<S: CacheStore, N: Network> FetchInterceptor<S, N> {
  pub fn new(store: Arc<S>, network: Arc<N>, origin: Url) -> Self {
    Self {
      store,
      network,
      origin,
    }
  }

  /// Whether a request is handled at all. Cross-origin and non-HTTP requests
  /// pass through untouched.
  pub fn intercepts(&self, request: &Request) -> bool {
    matches!(request.url.scheme(), "http" | "https")
      && request.url.origin() == self.origin.origin()
  }

  /// Serve a request with stale-while-revalidate.
  ///
  /// 1. Cached - return it now, refresh the entry in the background
  /// 2. Miss - fetch from network, store a 200 response before returning it
  /// 3. Network failure on a navigation - serve the offline document
  /// 4. Any other network failure - propagate it
  pub async fn handle(&self, bucket: &ActiveBucket, request: Request) -> Result<FetchOutcome> {
    let key = request.cache_key();

    let cached = match self.store.lookup(&bucket.version, &key) {
      Ok(cached) => cached,
      Err(e) => {
        warn!(key = %key, error = %e, "Cache lookup failed, treating as miss");
        None
      }
    };

    if let Some(response) = cached {
      debug!(key = %key, "Serving from cache");
      let refresh = self.spawn_refresh(bucket.version.clone(), request);
      return Ok(FetchOutcome {
        response,
        source: ResponseSource::Cache,
        refresh: Some(refresh),
      });
    }

    debug!(key = %key, "Fetching from network");
    match self.network.fetch(&request).await {
      Ok(response) => {
        if response.is_cacheable() && request.method == Method::GET {
          if let Err(e) = self.store.put(&bucket.version, &key, &response) {
            warn!(key = %key, error = %e, "Failed to cache network response");
          }
        }
        Ok(FetchOutcome::new(response, ResponseSource::Network))
      }
      Err(err) => {
        if request.is_navigation() {
          if let Some(document) = self.offline_document(bucket) {
            debug!(key = %key, error = %err, "Network failed, serving offline document");
            return Ok(FetchOutcome::new(document, ResponseSource::OfflineFallback));
          }
        }
        warn!(key = %key, error = %err, "Fetch failed");
        Err(err)
      }
    }
  }

  fn offline_document(&self, bucket: &ActiveBucket) -> Option<Response> {
    let key = RequestKey::new(&Method::GET, &bucket.offline_document);
    match self.store.lookup(&bucket.version, &key) {
      Ok(document) => document,
      Err(e) => {
        warn!(error = %e, "Failed to read offline document");
        None
      }
    }
  }

  /// Refresh a cached entry from the network. Failures are logged and dropped;
  /// the caller already has its response.
  fn spawn_refresh(&self, version: CacheVersion, request: Request) -> RefreshHandle {
    let store = Arc::clone(&self.store);
    let network = Arc::clone(&self.network);

    let task = tokio::spawn(async move {
      let key = request.cache_key();
      match network.fetch(&request).await {
        Ok(response) if response.is_cacheable() && request.method == Method::GET => {
          if let Err(e) = store.put(&version, &key, &response) {
            debug!(key = %key, error = %e, "Background refresh could not store response");
          }
        }
        Ok(response) => {
          debug!(key = %key, status = response.status, "Background refresh not cached");
        }
        Err(e) => {
          debug!(key = %key, error = %e, "Background refresh failed");
        }
      }
    });

    RefreshHandle { task }
  }
}
