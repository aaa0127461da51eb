//! Periodic and on-focus update checks while a page is open.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::lifecycle::{Controller, UpdateOutcome};
use crate::network::Network;

/// Default time between update checks.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest period the poller accepts; anything below is raised to this.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Background task asking the controller for updates. Stops when dropped.
pub struct PollerHandle {
  task: JoinHandle<()>,
}

impl PollerHandle {
  pub fn is_running(&self) -> bool {
    !self.task.is_finished()
  }
}

impl Drop for PollerHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

pub struct UpdatePoller;

impl UpdatePoller {
  /// Check for updates every `interval`, and whenever `visibility` flips to true.
  pub fn spawn<S: CacheStore, N: Network>(
    controller: Controller<S, N>,
    interval: Duration,
    mut visibility: watch::Receiver<bool>,
  ) -> PollerHandle {
    let interval = interval.max(MIN_UPDATE_INTERVAL);
    let task = tokio::spawn(async move {
      let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut watching = true;

      loop {
        tokio::select! {
          _ = ticker.tick() => {}
          changed = visibility.changed(), if watching => {
            if changed.is_err() {
              // Page side went away; keep the timer running
              watching = false;
              continue;
            }
            if !*visibility.borrow_and_update() {
              continue;
            }
            debug!("Page visible again, checking for updates");
          }
        }

        check(&controller).await;
      }
    });

    PollerHandle { task }
  }
}

async fn check<S: CacheStore, N: Network>(controller: &Controller<S, N>) {
  match controller.update().await {
    Ok(UpdateOutcome::UpToDate(_)) => debug!("No update available"),
    Ok(outcome) => info!(?outcome, "Update check finished"),
    Err(e) => debug!(error = %e, "Update check failed"),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use url::Url;

  use super::*;
  use crate::cache::{CacheVersion, SqliteStore};
  use crate::lifecycle::{ControllerSettings, DEFAULT_DESCRIPTOR_PATH};
  use crate::manifest::{AssetManifest, DeploymentDescriptor};
  use crate::network::Response;
  use crate::testing::{MockNetwork, ORIGIN};

  fn setup() -> (Controller<SqliteStore, MockNetwork>, Arc<MockNetwork>) {
    let network = Arc::new(MockNetwork::new());
    network.ok("/index.html", "home");
    let controller = Controller::new(
      Arc::new(SqliteStore::in_memory().unwrap()),
      Arc::clone(&network),
      ControllerSettings::new(Url::parse(ORIGIN).unwrap()),
    );
    (controller, network)
  }

  fn publish(network: &MockNetwork, version: &str) {
    let descriptor = DeploymentDescriptor {
      version: CacheVersion::from(version),
      core: AssetManifest::new(["/index.html"]),
      on_demand: AssetManifest::default(),
      offline_document: "/index.html".to_string(),
    };
    network.respond(
      DEFAULT_DESCRIPTOR_PATH,
      Response::ok(serde_json::to_vec(&descriptor).unwrap()),
    );
  }

  async fn settle() {
    for _ in 0..20 {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_polls_on_interval() {
    let (controller, network) = setup();
    publish(&network, "v1");
    let (_visible, visibility) = watch::channel(true);

    let _poller = UpdatePoller::spawn(controller.clone(), Duration::from_secs(60), visibility);
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 0);

    time::sleep(Duration::from_secs(61)).await;
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 1);
    assert_eq!(
      controller.active_version().unwrap(),
      Some(CacheVersion::from("v1"))
    );

    time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_checks_when_page_becomes_visible() {
    let (controller, network) = setup();
    publish(&network, "v1");
    let (visible, visibility) = watch::channel(true);

    let _poller = UpdatePoller::spawn(controller, Duration::from_secs(3600), visibility);
    settle().await;

    visible.send_replace(false);
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 0);

    visible.send_replace(true);
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_failures_do_not_stop_polling() {
    let (controller, network) = setup();
    network.go_offline();
    let (_visible, visibility) = watch::channel(true);

    let poller = UpdatePoller::spawn(controller, Duration::from_secs(10), visibility);
    time::sleep(Duration::from_secs(35)).await;
    settle().await;

    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 3);
    assert!(poller.is_running());
  }

  #[tokio::test(start_paused = true)]
  async fn test_zero_interval_is_raised() {
    let (controller, network) = setup();
    network.go_offline();
    let (_visible, visibility) = watch::channel(true);

    let poller = UpdatePoller::spawn(controller, Duration::ZERO, visibility);
    time::sleep(Duration::from_millis(3500)).await;
    settle().await;

    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 3);
    assert!(poller.is_running());
  }

  #[tokio::test(start_paused = true)]
  async fn test_stops_when_dropped() {
    let (controller, network) = setup();
    publish(&network, "v1");
    let (_visible, visibility) = watch::channel(true);

    let poller = UpdatePoller::spawn(controller, Duration::from_secs(10), visibility);
    drop(poller);
    time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(network.calls(DEFAULT_DESCRIPTOR_PATH), 0);
  }
}
