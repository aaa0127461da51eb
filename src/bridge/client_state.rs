//! String key/value state kept by the page: persistent and per-session.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

/// Preferred colour scheme.
pub const THEME_KEY: &str = "theme";
/// Epoch milliseconds until which the install prompt stays dismissed.
pub const INSTALL_DISMISSED_KEY: &str = "pwa-install-dismissed";
/// Session flag set when the update banner was dismissed.
pub const UPDATE_DISMISSED_KEY: &str = "pwa-update-dismissed";
/// Set once the app was installed from the prompt.
pub const INSTALLED_KEY: &str = "pwa-installed";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS client_state (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;
}

/// Persistent client state in SQLite.
pub struct SqliteClientState {
  conn: Mutex<Connection>,
}

impl SqliteClientState {
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    Self::with_connection(Connection::open(path)?)
  }

  pub fn in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
  }
}

impl KeyValueStore for SqliteClientState {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    Ok(
      conn
        .query_row(
          "SELECT value FROM client_state WHERE key = ?1",
          params![key],
          |row| row.get(0),
        )
        .optional()?,
    )
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR REPLACE INTO client_state (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn.execute("DELETE FROM client_state WHERE key = ?1", params![key])?;
    Ok(())
  }
}

/// State that lives only as long as the process.
#[derive(Default)]
pub struct SessionStorage {
  values: Mutex<HashMap<String, String>>,
}

impl SessionStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn values(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
    self
      .values
      .lock()
      .map_err(|e| Error::storage(format!("Lock poisoned: {}", e)))
  }
}

impl KeyValueStore for SessionStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.values()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.values()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.values()?.remove(key);
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl Theme {
  pub fn as_str(self) -> &'static str {
    match self {
      Theme::Light => "light",
      Theme::Dark => "dark",
    }
  }

  /// Saved theme, light when unset or unrecognised.
  pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
    Ok(match store.get(THEME_KEY)?.as_deref() {
      Some("dark") => Theme::Dark,
      _ => Theme::Light,
    })
  }

  pub fn save(self, store: &dyn KeyValueStore) -> Result<()> {
    store.set(THEME_KEY, self.as_str())
  }

  pub fn toggled(self) -> Self {
    match self {
      Theme::Light => Theme::Dark,
      Theme::Dark => Theme::Light,
    }
  }
}

impl fmt::Display for Theme {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_state_round_trip() {
    let state = SqliteClientState::in_memory().unwrap();
    assert_eq!(state.get(THEME_KEY).unwrap(), None);

    state.set(THEME_KEY, "dark").unwrap();
    state.set(THEME_KEY, "light").unwrap();
    assert_eq!(state.get(THEME_KEY).unwrap().as_deref(), Some("light"));

    state.remove(THEME_KEY).unwrap();
    assert_eq!(state.get(THEME_KEY).unwrap(), None);
  }

  #[test]
  fn test_sqlite_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("client.db");

    SqliteClientState::open_at(&path)
      .unwrap()
      .set(INSTALL_DISMISSED_KEY, "1700000000000")
      .unwrap();

    let reopened = SqliteClientState::open_at(&path).unwrap();
    assert_eq!(
      reopened.get(INSTALL_DISMISSED_KEY).unwrap().as_deref(),
      Some("1700000000000")
    );
  }

  #[test]
  fn test_theme_defaults_to_light() {
    let session = SessionStorage::new();
    assert_eq!(Theme::load(&session).unwrap(), Theme::Light);

    session.set(THEME_KEY, "solarized").unwrap();
    assert_eq!(Theme::load(&session).unwrap(), Theme::Light);
  }

  #[test]
  fn test_theme_toggle_persists() {
    let state = SqliteClientState::in_memory().unwrap();
    let theme = Theme::load(&state).unwrap().toggled();
    theme.save(&state).unwrap();

    assert_eq!(Theme::load(&state).unwrap(), Theme::Dark);
    assert_eq!(state.get(THEME_KEY).unwrap().as_deref(), Some("dark"));
  }
}
