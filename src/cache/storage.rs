//! SQLite implementation of the cache store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::traits::{CacheStore, CacheVersion, RequestKey};
use crate::error::{Error, Result};
use crate::network::{Response, ResponseKind};

/// SQLite-based cache storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// A store that lives only as long as the process.
  pub fn in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::storage("Could not determine data directory"))?;

    Ok(data_dir.join("pnv").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self.conn()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- One row per deployment bucket
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    note TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, keyed by sha256(method + url)
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, key_hash),
    FOREIGN KEY (bucket) REFERENCES buckets(name) ON DELETE CASCADE
);
"#;

fn kind_label(kind: ResponseKind) -> &'static str {
  match kind {
    ResponseKind::Basic => "basic",
    ResponseKind::Cors => "cors",
    ResponseKind::Opaque => "opaque",
    ResponseKind::Error => "error",
  }
}

fn kind_from_label(s: &str) -> ResponseKind {
  match s {
    "cors" => ResponseKind::Cors,
    "opaque" => ResponseKind::Opaque,
    "error" => ResponseKind::Error,
    _ => ResponseKind::Basic,
  }
}

fn bucket_exists(conn: &Connection, bucket: &CacheVersion) -> Result<bool> {
  let found: Option<i64> = conn
    .query_row(
      "SELECT 1 FROM buckets WHERE name = ?",
      params![bucket.as_str()],
      |row| row.get(0),
    )
    .optional()?;
  Ok(found.is_some())
}

fn insert_entry(
  conn: &Connection,
  bucket: &CacheVersion,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)?;
  conn.execute(
    "INSERT OR REPLACE INTO entries (bucket, key_hash, method, url, status, kind, headers, body, stored_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    params![
      bucket.as_str(),
      key.hash(),
      key.method(),
      key.url(),
      response.status,
      kind_label(response.kind),
      headers,
      response.body,
    ],
  )?;
  Ok(())
}

impl CacheStore for SqliteStore {
  fn open(&self, bucket: &CacheVersion) -> Result<()> {
    self.conn()?.execute(
      "INSERT OR IGNORE INTO buckets (name) VALUES (?)",
      params![bucket.as_str()],
    )?;
    Ok(())
  }

  fn has(&self, bucket: &CacheVersion) -> Result<bool> {
    let conn = self.conn()?;
    bucket_exists(&conn, bucket)
  }

  fn keys(&self) -> Result<Vec<CacheVersion>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM buckets ORDER BY rowid")?;
    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names.into_iter().map(CacheVersion::from).collect())
  }

  fn delete(&self, bucket: &CacheVersion) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM entries WHERE bucket = ?",
      params![bucket.as_str()],
    )?;
    let removed = tx.execute("DELETE FROM buckets WHERE name = ?", params![bucket.as_str()])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn lookup(&self, bucket: &CacheVersion, key: &RequestKey) -> Result<Option<Response>> {
    let conn = self.conn()?;
    let row: Option<(u16, String, String, Vec<u8>)> = conn
      .query_row(
        "SELECT status, kind, headers, body FROM entries WHERE bucket = ? AND key_hash = ?",
        params![bucket.as_str(), key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, kind, headers, body)) => Ok(Some(Response {
        status,
        headers: serde_json::from_str(&headers)?,
        body,
        kind: kind_from_label(&kind),
      })),
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &CacheVersion, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.conn()?;
    // Only open() creates buckets, so a late write cannot resurrect a deleted one.
    if !bucket_exists(&conn, bucket)? {
      return Err(Error::storage(format!("bucket {} does not exist", bucket)));
    }
    insert_entry(&conn, bucket, key, response)
  }

  fn put_all(&self, bucket: &CacheVersion, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    if !bucket_exists(&tx, bucket)? {
      return Err(Error::storage(format!("bucket {} does not exist", bucket)));
    }
    for (key, response) in entries {
      insert_entry(&tx, bucket, key, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn len(&self, bucket: &CacheVersion) -> Result<usize> {
    let count: i64 = self.conn()?.query_row(
      "SELECT COUNT(*) FROM entries WHERE bucket = ?",
      params![bucket.as_str()],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  fn annotate(&self, bucket: &CacheVersion, note: &str) -> Result<()> {
    let updated = self.conn()?.execute(
      "UPDATE buckets SET note = ? WHERE name = ?",
      params![note, bucket.as_str()],
    )?;
    if updated == 0 {
      return Err(Error::storage(format!("bucket {} does not exist", bucket)));
    }
    Ok(())
  }

  fn annotation(&self, bucket: &CacheVersion) -> Result<Option<String>> {
    let note: Option<Option<String>> = self
      .conn()?
      .query_row(
        "SELECT note FROM buckets WHERE name = ?",
        params![bucket.as_str()],
        |row| row.get(0),
      )
      .optional()?;
    Ok(note.flatten())
  }
}
