use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::client_state::{KeyValueStore, UPDATE_DISMISSED_KEY};
use super::{deadline, BridgeAction};
use crate::cache::CacheVersion;
use crate::error::Result;
use crate::messages::ControlMessage;

/// "New Version Available" banner with update-now, later and auto-apply.
#[derive(Debug)]
pub struct UpdateNotice {
  enabled: bool,
  auto_apply: Duration,
  /// Version the banner is showing
  pending: Option<CacheVersion>,
  apply_at: Option<DateTime<Utc>>,
  /// SKIP_WAITING was sent; reload when control transfers
  awaiting_control: bool,
}

impl UpdateNotice {
  pub fn new(enabled: bool, auto_apply: Duration) -> Self {
    Self {
      enabled,
      auto_apply,
      pending: None,
      apply_at: None,
      awaiting_control: false,
    }
  }

  pub fn pending(&self) -> Option<&CacheVersion> {
    self.pending.as_ref()
  }

  /// A new instance finished installing. Only a controlled page has anything
  /// to update from.
  pub fn installed(
    &mut self,
    version: CacheVersion,
    controlled: bool,
    now: DateTime<Utc>,
    session: &dyn KeyValueStore,
  ) -> Result<Vec<BridgeAction>> {
    if !controlled {
      debug!(version = %version, "First install, no update banner");
      return Ok(Vec::new());
    }
    info!(version = %version, "New version available");

    if !self.enabled || session.get(UPDATE_DISMISSED_KEY)?.is_some() {
      return Ok(Vec::new());
    }

    self.pending = Some(version.clone());
    self.apply_at = (!self.auto_apply.is_zero()).then(|| deadline(now, self.auto_apply));
    Ok(vec![BridgeAction::ShowUpdateBanner { version }])
  }

  pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<BridgeAction> {
    match self.apply_at {
      Some(at) if at <= now && self.pending.is_some() => {
        debug!("No answer to update banner, applying");
        self.apply()
      }
      _ => Vec::new(),
    }
  }

  /// "Update Now".
  pub fn apply(&mut self) -> Vec<BridgeAction> {
    self.apply_at = None;
    let mut actions = Vec::new();
    if self.pending.take().is_some() {
      actions.push(BridgeAction::HideUpdateBanner);
    }
    self.awaiting_control = true;
    actions.push(BridgeAction::PostMessage(ControlMessage::SkipWaiting));
    actions
  }

  /// "Later": hide, and stay hidden for the rest of the session.
  pub fn dismiss(&mut self, session: &dyn KeyValueStore) -> Result<Vec<BridgeAction>> {
    session.set(UPDATE_DISMISSED_KEY, "true")?;
    self.apply_at = None;
    Ok(if self.pending.take().is_some() {
      vec![BridgeAction::HideUpdateBanner]
    } else {
      Vec::new()
    })
  }

  /// Control moved to a new instance.
  pub fn controller_changed(&mut self) -> Option<BridgeAction> {
    std::mem::take(&mut self.awaiting_control).then_some(BridgeAction::Reload)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration as Span, TimeZone};

  use super::*;
  use crate::bridge::client_state::SessionStorage;

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
  }

  fn notice() -> UpdateNotice {
    UpdateNotice::new(true, Duration::from_secs(5))
  }

  fn v2() -> CacheVersion {
    CacheVersion::from("pera-nai-vai-v1.1.0")
  }

  #[test]
  fn test_banner_only_for_controlled_page() {
    let session = SessionStorage::new();
    let mut notice = notice();

    assert!(notice.installed(v2(), false, start(), &session).unwrap().is_empty());
    assert_eq!(
      notice.installed(v2(), true, start(), &session).unwrap(),
      vec![BridgeAction::ShowUpdateBanner { version: v2() }]
    );
    assert_eq!(notice.pending(), Some(&v2()));
  }

  #[test]
  fn test_update_now_skips_waiting_then_reloads_once() {
    let session = SessionStorage::new();
    let mut notice = notice();
    notice.installed(v2(), true, start(), &session).unwrap();

    assert_eq!(
      notice.apply(),
      vec![
        BridgeAction::HideUpdateBanner,
        BridgeAction::PostMessage(ControlMessage::SkipWaiting)
      ]
    );
    assert_eq!(notice.controller_changed(), Some(BridgeAction::Reload));
    assert_eq!(notice.controller_changed(), None);
  }

  #[test]
  fn test_auto_apply_after_delay() {
    let session = SessionStorage::new();
    let mut notice = notice();
    notice.installed(v2(), true, start(), &session).unwrap();

    assert!(notice.tick(start() + Span::seconds(4)).is_empty());
    let actions = notice.tick(start() + Span::seconds(5));
    assert!(actions.contains(&BridgeAction::PostMessage(ControlMessage::SkipWaiting)));
    assert!(notice.tick(start() + Span::seconds(10)).is_empty());
  }

  #[test]
  fn test_later_suppresses_for_session() {
    let session = SessionStorage::new();
    let mut notice = notice();
    notice.installed(v2(), true, start(), &session).unwrap();

    assert_eq!(
      notice.dismiss(&session).unwrap(),
      vec![BridgeAction::HideUpdateBanner]
    );
    assert!(notice.tick(start() + Span::seconds(30)).is_empty());
    assert_eq!(notice.controller_changed(), None);

    let v3 = CacheVersion::from("pera-nai-vai-v1.2.0");
    assert!(notice.installed(v3, true, start(), &session).unwrap().is_empty());
  }

  #[test]
  fn test_zero_delay_disables_auto_apply() {
    let session = SessionStorage::new();
    let mut notice = UpdateNotice::new(true, Duration::ZERO);
    notice.installed(v2(), true, start(), &session).unwrap();
    assert!(notice.tick(start() + Span::hours(1)).is_empty());
  }
}
