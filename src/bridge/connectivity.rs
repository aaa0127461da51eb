use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{deadline, BridgeAction};

pub const OFFLINE_MESSAGE: &str = "You are offline - some features may be limited";
pub const ONLINE_MESSAGE: &str = "Back online! ✓";

/// How long the back-online message stays up.
pub const ONLINE_LINGER: Duration = Duration::from_secs(3);

/// Offline banner driven by connectivity changes.
#[derive(Debug)]
pub struct OfflineIndicator {
  enabled: bool,
  online: bool,
  hide_at: Option<DateTime<Utc>>,
}

impl OfflineIndicator {
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      online: true,
      hide_at: None,
    }
  }

  pub fn is_online(&self) -> bool {
    self.online
  }

  pub fn changed(&mut self, online: bool, now: DateTime<Utc>) -> Option<BridgeAction> {
    if online == self.online {
      return None;
    }
    self.online = online;
    if !self.enabled {
      return None;
    }

    if online {
      self.hide_at = Some(deadline(now, ONLINE_LINGER));
      Some(BridgeAction::ShowOfflineIndicator {
        message: ONLINE_MESSAGE.to_string(),
      })
    } else {
      self.hide_at = None;
      Some(BridgeAction::ShowOfflineIndicator {
        message: OFFLINE_MESSAGE.to_string(),
      })
    }
  }

  pub fn tick(&mut self, now: DateTime<Utc>) -> Option<BridgeAction> {
    match self.hide_at {
      Some(at) if at <= now => {
        self.hide_at = None;
        Some(BridgeAction::HideOfflineIndicator)
      }
      _ => None,
    }
  }
}
