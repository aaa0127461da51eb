//! Test doubles shared by the module tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use crate::cache::{CacheStore, CacheVersion, RequestKey, SqliteStore};
use crate::error::{Error, Result};
use crate::network::{Network, Request, Response};

pub const ORIGIN: &str = "https://peranaivai.example";

/// Absolute URL of a path on the test origin.
pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

enum Route {
  Respond(Response),
  Fail(String),
}

/// Scripted network: per-URL responses or failures, 404 for anything else.
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
  gate: watch::Sender<bool>,
}

impl MockNetwork {
  pub fn new() -> Self {
    let (gate, _) = watch::channel(true);
    Self {
      routes: Mutex::new(HashMap::new()),
      calls: Mutex::new(Vec::new()),
      offline: AtomicBool::new(false),
      gate,
    }
  }

  pub fn respond(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url(path).to_string(), Route::Respond(response));
  }

  pub fn ok(&self, path: &str, body: &str) {
    self.respond(path, Response::ok(body));
  }

  pub fn fail(&self, path: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url(path).to_string(), Route::Fail("connection reset".into()));
  }

  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn go_online(&self) {
    self.offline.store(false, Ordering::SeqCst);
  }

  /// Block every fetch until `release` is called.
  pub fn hold(&self) {
    self.gate.send_replace(false);
  }

  pub fn release(&self) {
    self.gate.send_replace(true);
  }

  /// Number of fetches made for a path.
  pub fn calls(&self, path: &str) -> usize {
    let target = url(path).to_string();
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|u| **u == target)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let target = request.url.to_string();
    self.calls.lock().unwrap().push(target.clone());

    let mut gate = self.gate.subscribe();
    let _ = gate.wait_for(|open| *open).await;

    if self.offline.load(Ordering::SeqCst) {
      return Err(Error::network(target, "offline"));
    }

    match self.routes.lock().unwrap().get(&target) {
      Some(Route::Respond(response)) => Ok(response.clone()),
      Some(Route::Fail(reason)) => Err(Error::network(target, reason.clone())),
      None => Ok(Response::new(404, "not found")),
    }
  }
}

/// SQLite store with injectable failures.
pub struct FlakyStore {
  inner: SqliteStore,
  failing_deletes: Mutex<HashSet<CacheVersion>>,
  fail_open: AtomicBool,
}

impl FlakyStore {
  pub fn new() -> Self {
    Self {
      inner: SqliteStore::in_memory().unwrap(),
      failing_deletes: Mutex::new(HashSet::new()),
      fail_open: AtomicBool::new(false),
    }
  }

  pub fn fail_delete_of(&self, bucket: &str) {
    self
      .failing_deletes
      .lock()
      .unwrap()
      .insert(CacheVersion::from(bucket));
  }

  pub fn heal_deletes(&self) {
    self.failing_deletes.lock().unwrap().clear();
  }

  pub fn fail_open(&self, fail: bool) {
    self.fail_open.store(fail, Ordering::SeqCst);
  }
}

impl CacheStore for FlakyStore {
  fn open(&self, bucket: &CacheVersion) -> Result<()> {
    if self.fail_open.load(Ordering::SeqCst) {
      return Err(Error::storage("quota exceeded"));
    }
    self.inner.open(bucket)
  }

  fn has(&self, bucket: &CacheVersion) -> Result<bool> {
    self.inner.has(bucket)
  }

  fn keys(&self) -> Result<Vec<CacheVersion>> {
    self.inner.keys()
  }

  fn delete(&self, bucket: &CacheVersion) -> Result<bool> {
    if self.failing_deletes.lock().unwrap().contains(bucket) {
      return Err(Error::storage(format!("cannot delete {}", bucket)));
    }
    self.inner.delete(bucket)
  }

  fn lookup(&self, bucket: &CacheVersion, key: &RequestKey) -> Result<Option<Response>> {
    self.inner.lookup(bucket, key)
  }

  fn put(&self, bucket: &CacheVersion, key: &RequestKey, response: &Response) -> Result<()> {
    self.inner.put(bucket, key, response)
  }

  fn put_all(&self, bucket: &CacheVersion, entries: &[(RequestKey, Response)]) -> Result<()> {
    self.inner.put_all(bucket, entries)
  }

  fn len(&self, bucket: &CacheVersion) -> Result<usize> {
    self.inner.len(bucket)
  }

  fn annotate(&self, bucket: &CacheVersion, note: &str) -> Result<()> {
    self.inner.annotate(bucket, note)
  }

  fn annotation(&self, bucket: &CacheVersion) -> Result<Option<String>> {
    self.inner.annotation(bucket)
  }
}
