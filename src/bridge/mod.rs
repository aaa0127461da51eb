//! Page-side glue: install prompt, update banner, offline indicator and theme.
//!
//! The bridge holds no timers. The front end feeds it events and calls
//! [`ClientBridge::tick`] regularly, then carries out the returned actions.

mod client_state;
mod connectivity;
mod install_prompt;
mod update_notice;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use client_state::{
  KeyValueStore, SessionStorage, SqliteClientState, Theme, INSTALLED_KEY, INSTALL_DISMISSED_KEY,
  THEME_KEY, UPDATE_DISMISSED_KEY,
};
pub use connectivity::{OfflineIndicator, OFFLINE_MESSAGE, ONLINE_MESSAGE};
pub use install_prompt::{InstallPrompt, DISMISS_COOLDOWN};
pub use update_notice::UpdateNotice;

use crate::cache::CacheVersion;
use crate::error::Result;
use crate::lifecycle::{ClientId, ControllerEvent, InstanceState};
use crate::messages::ControlMessage;

/// Something the front end should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeAction {
  ShowInstallPrompt,
  HideInstallPrompt,
  /// Show the platform's own install dialog
  RequestInstall,
  ShowUpdateBanner { version: CacheVersion },
  HideUpdateBanner,
  /// Send a message to the controller
  PostMessage(ControlMessage),
  /// Reload the page under its new controller
  Reload,
  ShowOfflineIndicator { message: String },
  HideOfflineIndicator,
}

/// Feature flags and delays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
  pub show_install_prompt: bool,
  pub install_prompt_delay: Duration,
  pub show_update_notification: bool,
  /// Zero disables auto-apply
  pub auto_update_delay: Duration,
  pub enable_offline_indicator: bool,
  pub update_interval: Duration,
}

impl Default for BridgeSettings {
  fn default() -> Self {
    Self {
      show_install_prompt: true,
      install_prompt_delay: Duration::from_secs(30),
      show_update_notification: true,
      auto_update_delay: Duration::from_secs(5),
      enable_offline_indicator: true,
      update_interval: crate::revalidate::DEFAULT_UPDATE_INTERVAL,
    }
  }
}

/// `now + delay`, saturating instead of overflowing.
pub(crate) fn deadline(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
  chrono::Duration::from_std(delay)
    .ok()
    .and_then(|delay| now.checked_add_signed(delay))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct ClientBridge {
  settings: BridgeSettings,
  local: Arc<dyn KeyValueStore>,
  session: Arc<dyn KeyValueStore>,
  install: InstallPrompt,
  update: UpdateNotice,
  connectivity: OfflineIndicator,
  theme: Theme,
}

impl ClientBridge {
  pub fn new(
    settings: BridgeSettings,
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    standalone: bool,
  ) -> Result<Self> {
    let theme = Theme::load(local.as_ref())?;
    let standalone = standalone || install_prompt::remembered_install(local.as_ref())?;
    Ok(Self {
      install: InstallPrompt::new(
        settings.show_install_prompt,
        settings.install_prompt_delay,
        standalone,
      ),
      update: UpdateNotice::new(settings.show_update_notification, settings.auto_update_delay),
      connectivity: OfflineIndicator::new(settings.enable_offline_indicator),
      settings,
      local,
      session,
      theme,
    })
  }

  pub fn settings(&self) -> &BridgeSettings {
    &self.settings
  }

  pub fn theme(&self) -> Theme {
    self.theme
  }

  pub fn toggle_theme(&mut self) -> Result<Theme> {
    let next = self.theme.toggled();
    next.save(self.local.as_ref())?;
    self.theme = next;
    Ok(next)
  }

  pub fn is_online(&self) -> bool {
    self.connectivity.is_online()
  }

  pub fn pending_update(&self) -> Option<&CacheVersion> {
    self.update.pending()
  }

  pub fn install_prompt_visible(&self) -> bool {
    self.install.is_visible()
  }

  // Install prompt

  pub fn install_available(&mut self, now: DateTime<Utc>) -> Result<()> {
    self.install.offer(now, self.local.as_ref())
  }

  pub fn accept_install(&mut self) -> Vec<BridgeAction> {
    self.install.accept()
  }

  pub fn dismiss_install(&mut self, now: DateTime<Utc>) -> Result<Vec<BridgeAction>> {
    self.install.dismiss(now, self.local.as_ref())
  }

  pub fn app_installed(&mut self) -> Result<Vec<BridgeAction>> {
    self.install.installed(self.local.as_ref())
  }

  // Updates

  /// React to a controller event seen by the page `client`.
  pub fn controller_event(
    &mut self,
    event: &ControllerEvent,
    client: ClientId,
    controlled: bool,
    now: DateTime<Utc>,
  ) -> Result<Vec<BridgeAction>> {
    match event {
      ControllerEvent::StateChanged {
        version,
        state: InstanceState::Installed,
      } => self
        .update
        .installed(version.clone(), controlled, now, self.session.as_ref()),
      ControllerEvent::ControllerChanged { clients, .. } if clients.contains(&client) => {
        Ok(self.update.controller_changed().into_iter().collect())
      }
      _ => Ok(Vec::new()),
    }
  }

  pub fn apply_update(&mut self) -> Vec<BridgeAction> {
    self.update.apply()
  }

  pub fn dismiss_update(&mut self) -> Result<Vec<BridgeAction>> {
    self.update.dismiss(self.session.as_ref())
  }

  // Connectivity

  pub fn connectivity_changed(&mut self, online: bool, now: DateTime<Utc>) -> Vec<BridgeAction> {
    self.connectivity.changed(online, now).into_iter().collect()
  }

  /// Fire whatever timers are due.
  pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<BridgeAction> {
    let mut actions: Vec<BridgeAction> = self.install.tick(now).into_iter().collect();
    actions.extend(self.update.tick(now));
    actions.extend(self.connectivity.tick(now));
    actions
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration as Span, TimeZone};
  use url::Url;

  use super::*;
  use crate::cache::SqliteStore;
  use crate::lifecycle::{Controller, ControllerSettings};
  use crate::manifest::{AssetManifest, DeploymentDescriptor};
  use crate::testing::{MockNetwork, ORIGIN};

  fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
  }

  fn bridge() -> ClientBridge {
    ClientBridge::new(
      BridgeSettings::default(),
      Arc::new(SqliteClientState::in_memory().unwrap()),
      Arc::new(SessionStorage::new()),
      false,
    )
    .unwrap()
  }

  fn descriptor(version: &str) -> DeploymentDescriptor {
    DeploymentDescriptor {
      version: CacheVersion::from(version),
      core: AssetManifest::new(["/index.html"]),
      on_demand: AssetManifest::default(),
      offline_document: "/index.html".to_string(),
    }
  }

  #[tokio::test]
  async fn test_update_flow_end_to_end() {
    let network = std::sync::Arc::new(MockNetwork::new());
    network.ok("/index.html", "home");
    let controller = Controller::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      network,
      ControllerSettings::new(Url::parse(ORIGIN).unwrap()),
    );
    controller.install(descriptor("v1")).await.unwrap();
    let mut page = controller.connect().unwrap();
    let mut bridge = bridge();

    controller.install(descriptor("v2")).await.unwrap();
    let mut shown = Vec::new();
    while let Some(event) = page.try_next_event() {
      let controlled = page.controlled_by().is_some();
      shown.extend(
        bridge
          .controller_event(&event, page.id(), controlled, start())
          .unwrap(),
      );
    }
    assert_eq!(
      shown,
      vec![BridgeAction::ShowUpdateBanner {
        version: CacheVersion::from("v2")
      }]
    );

    let actions = bridge.tick(start() + Span::seconds(5));
    let message = actions
      .iter()
      .find_map(|a| match a {
        BridgeAction::PostMessage(m) => Some(m.clone()),
        _ => None,
      })
      .unwrap();
    page.post_message(message);

    let reload = loop {
      let event = page.next_event().await.unwrap();
      let actions = bridge
        .controller_event(&event, page.id(), true, start())
        .unwrap();
      if !actions.is_empty() {
        break actions;
      }
    };
    assert_eq!(reload, vec![BridgeAction::Reload]);
    assert_eq!(page.controlled_by(), Some(CacheVersion::from("v2")));
  }

  #[test]
  fn test_tick_collects_all_timers() {
    let mut bridge = bridge();
    bridge.install_available(start()).unwrap();
    bridge.connectivity_changed(false, start());
    bridge.connectivity_changed(true, start() + Span::seconds(28));

    let actions = bridge.tick(start() + Span::seconds(31));
    assert_eq!(
      actions,
      vec![
        BridgeAction::ShowInstallPrompt,
        BridgeAction::HideOfflineIndicator
      ]
    );
    assert!(bridge.install_prompt_visible());
  }

  #[test]
  fn test_theme_toggle_is_remembered() {
    let local: Arc<dyn KeyValueStore> = Arc::new(SqliteClientState::in_memory().unwrap());
    let session: Arc<dyn KeyValueStore> = Arc::new(SessionStorage::new());

    let mut bridge = ClientBridge::new(
      BridgeSettings::default(),
      Arc::clone(&local),
      Arc::clone(&session),
      false,
    )
    .unwrap();
    assert_eq!(bridge.theme(), Theme::Light);
    assert_eq!(bridge.toggle_theme().unwrap(), Theme::Dark);

    let reopened = ClientBridge::new(BridgeSettings::default(), local, session, false).unwrap();
    assert_eq!(reopened.theme(), Theme::Dark);
  }

  #[test]
  fn test_accepted_install_is_remembered() {
    let local: Arc<dyn KeyValueStore> = Arc::new(SqliteClientState::in_memory().unwrap());
    let session: Arc<dyn KeyValueStore> = Arc::new(SessionStorage::new());

    let mut first = ClientBridge::new(
      BridgeSettings::default(),
      Arc::clone(&local),
      Arc::clone(&session),
      false,
    )
    .unwrap();
    first.install_available(start()).unwrap();
    first.tick(start() + Span::seconds(30));
    assert_eq!(
      first.accept_install(),
      vec![BridgeAction::RequestInstall, BridgeAction::HideInstallPrompt]
    );
    assert!(first.app_installed().unwrap().is_empty());

    let mut second = ClientBridge::new(BridgeSettings::default(), local, session, false).unwrap();
    let later = start() + Span::days(1);
    second.install_available(later).unwrap();
    assert!(second.tick(later + Span::seconds(30)).is_empty());
    assert!(!second.install_prompt_visible());
  }

  #[test]
  fn test_deadline_saturates() {
    let far = deadline(start(), Duration::from_secs(u64::MAX));
    assert_eq!(far, DateTime::<Utc>::MAX_UTC);
  }
}
