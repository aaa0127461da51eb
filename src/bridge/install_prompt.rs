use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

use super::client_state::{KeyValueStore, INSTALLED_KEY, INSTALL_DISMISSED_KEY};
use super::{deadline, BridgeAction};
use crate::error::Result;

/// How long "Maybe Later" keeps the install prompt away.
pub const DISMISS_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Deferred, dismissible replacement for the platform install prompt.
#[derive(Debug)]
pub struct InstallPrompt {
  enabled: bool,
  delay: Duration,
  /// The app already runs installed
  standalone: bool,
  /// The platform offered to install and the offer was held back
  deferred: bool,
  show_at: Option<DateTime<Utc>>,
  visible: bool,
}

impl InstallPrompt {
  pub fn new(enabled: bool, delay: Duration, standalone: bool) -> Self {
    Self {
      enabled,
      delay,
      standalone,
      deferred: false,
      show_at: None,
      visible: false,
    }
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  /// The platform offered to install the app. Hold the offer and schedule
  /// the custom prompt unless it is still in its dismissal cooldown.
  pub fn offer(&mut self, now: DateTime<Utc>, local: &dyn KeyValueStore) -> Result<()> {
    if !self.enabled {
      return Ok(());
    }
    self.deferred = true;
    debug!("Install prompt captured");

    if let Some(until) = dismissed_until(local)? {
      if until > now {
        debug!(%until, "Install prompt dismissed");
        return Ok(());
      }
    }
    self.show_at = Some(deadline(now, self.delay));
    Ok(())
  }

  pub fn tick(&mut self, now: DateTime<Utc>) -> Option<BridgeAction> {
    match self.show_at {
      Some(at) if at <= now => {
        self.show_at = None;
        if self.standalone || !self.deferred {
          return None;
        }
        self.visible = true;
        Some(BridgeAction::ShowInstallPrompt)
      }
      _ => None,
    }
  }

  /// "Install App": hand over to the platform prompt.
  pub fn accept(&mut self) -> Vec<BridgeAction> {
    if !self.deferred {
      debug!("Install prompt not available");
      return Vec::new();
    }
    self.deferred = false;
    let mut actions = vec![BridgeAction::RequestInstall];
    if std::mem::take(&mut self.visible) {
      actions.push(BridgeAction::HideInstallPrompt);
    }
    actions
  }

  /// "Maybe Later": hide and stay away for the cooldown.
  pub fn dismiss(&mut self, now: DateTime<Utc>, local: &dyn KeyValueStore) -> Result<Vec<BridgeAction>> {
    let until = deadline(now, DISMISS_COOLDOWN);
    local.set(INSTALL_DISMISSED_KEY, &until.timestamp_millis().to_string())?;
    self.show_at = None;

    Ok(if std::mem::take(&mut self.visible) {
      vec![BridgeAction::HideInstallPrompt]
    } else {
      Vec::new()
    })
  }

  /// The app was installed; nothing left to offer, now or on later launches.
  pub fn installed(&mut self, local: &dyn KeyValueStore) -> Result<Vec<BridgeAction>> {
    info!("App installed successfully");
    local.set(INSTALLED_KEY, "true")?;
    self.deferred = false;
    self.show_at = None;
    self.standalone = true;
    Ok(if std::mem::take(&mut self.visible) {
      vec![BridgeAction::HideInstallPrompt]
    } else {
      Vec::new()
    })
  }
}

/// Whether an earlier launch recorded the app as installed.
pub(crate) fn remembered_install(local: &dyn KeyValueStore) -> Result<bool> {
  Ok(local.get(INSTALLED_KEY)?.as_deref() == Some("true"))
}

/// A stored value that is not a timestamp counts as no dismissal.
fn dismissed_until(local: &dyn KeyValueStore) -> Result<Option<DateTime<Utc>>> {
  Ok(
    local
      .get(INSTALL_DISMISSED_KEY)?
      .and_then(|raw| raw.trim().parse::<i64>().ok())
      .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
  )
}

#[cfg(test)]
mod tests {
  use chrono::Duration as Span;

  use super::*;
  use crate::bridge::client_state::SessionStorage;

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
  }

  fn prompt() -> InstallPrompt {
    InstallPrompt::new(true, Duration::from_secs(30), false)
  }

  #[test]
  fn test_shown_after_delay() {
    let local = SessionStorage::new();
    let mut prompt = prompt();
    prompt.offer(start(), &local).unwrap();

    assert_eq!(prompt.tick(start() + Span::seconds(29)), None);
    assert_eq!(
      prompt.tick(start() + Span::seconds(30)),
      Some(BridgeAction::ShowInstallPrompt)
    );
    assert!(prompt.is_visible());
    assert_eq!(prompt.tick(start() + Span::seconds(60)), None);
  }

  #[test]
  fn test_not_shown_when_standalone_or_disabled() {
    let local = SessionStorage::new();

    let mut standalone = InstallPrompt::new(true, Duration::from_secs(30), true);
    standalone.offer(start(), &local).unwrap();
    assert_eq!(standalone.tick(start() + Span::minutes(1)), None);

    let mut disabled = InstallPrompt::new(false, Duration::from_secs(30), false);
    disabled.offer(start(), &local).unwrap();
    assert_eq!(disabled.tick(start() + Span::minutes(1)), None);
    assert!(disabled.accept().is_empty());
  }

  #[test]
  fn test_dismissal_cooldown() {
    let local = SessionStorage::new();
    let mut shown = prompt();
    shown.offer(start(), &local).unwrap();
    shown.tick(start() + Span::seconds(30));

    let actions = shown.dismiss(start() + Span::seconds(40), &local).unwrap();
    assert_eq!(actions, vec![BridgeAction::HideInstallPrompt]);
    let stored: i64 = local.get(INSTALL_DISMISSED_KEY).unwrap().unwrap().parse().unwrap();
    assert_eq!(
      stored,
      (start() + Span::seconds(40) + Span::days(7)).timestamp_millis()
    );

    // Next visit within the week: no prompt
    let mut next = prompt();
    next.offer(start() + Span::days(3), &local).unwrap();
    assert_eq!(next.tick(start() + Span::days(4)), None);

    // After the cooldown it is offered again
    let mut later = prompt();
    let after = start() + Span::days(8);
    later.offer(after, &local).unwrap();
    assert_eq!(
      later.tick(after + Span::seconds(30)),
      Some(BridgeAction::ShowInstallPrompt)
    );
  }

  #[test]
  fn test_accept_hands_over_once() {
    let local = SessionStorage::new();
    let mut prompt = prompt();
    prompt.offer(start(), &local).unwrap();
    prompt.tick(start() + Span::seconds(30));

    assert_eq!(
      prompt.accept(),
      vec![BridgeAction::RequestInstall, BridgeAction::HideInstallPrompt]
    );
    assert!(prompt.accept().is_empty());
  }

  #[test]
  fn test_installed_hides_prompt() {
    let local = SessionStorage::new();
    let mut prompt = prompt();
    prompt.offer(start(), &local).unwrap();
    prompt.tick(start() + Span::seconds(30));

    assert_eq!(
      prompt.installed(&local).unwrap(),
      vec![BridgeAction::HideInstallPrompt]
    );
    assert!(remembered_install(&local).unwrap());
    prompt.offer(start() + Span::minutes(5), &local).unwrap();
    assert_eq!(prompt.tick(start() + Span::hours(1)), None);
  }

  #[test]
  fn test_garbage_dismissal_is_ignored() {
    let local = SessionStorage::new();
    local.set(INSTALL_DISMISSED_KEY, "true").unwrap();

    let mut prompt = prompt();
    prompt.offer(start(), &local).unwrap();
    assert_eq!(
      prompt.tick(start() + Span::seconds(30)),
      Some(BridgeAction::ShowInstallPrompt)
    );
  }
}
