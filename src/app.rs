use crate::event::{Event, EventHandler, FetchReport};
use crate::ui;
use chrono::Utc;
use color_eyre::Result;
use crossterm::event::{DisableFocusChange, EnableFocusChange, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use pnv::bridge::{BridgeAction, ClientBridge, Theme};
use pnv::cache::{CacheVersion, ResponseSource, SqliteStore};
use pnv::lifecycle::{ClientConnection, Controller, ControllerEvent, InstanceState, UpdateOutcome};
use pnv::manifest::DeploymentDescriptor;
use pnv::messages::{ControlMessage, Envelope};
use pnv::network::{Destination, HttpNetwork, Request};
use pnv::revalidate::{PollerHandle, UpdatePoller};
use ratatui::prelude::*;
use std::collections::VecDeque;
use std::io::stdout;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

pub type SiteController = Controller<SqliteStore, HttpNetwork>;
type Page = ClientConnection<SqliteStore, HttpNetwork>;

/// Last fetch of one asset
#[derive(Debug, Clone)]
pub enum AssetState {
  Loading,
  Done(FetchReport),
  Failed(String),
}

/// One row of the asset list
#[derive(Debug, Clone)]
pub struct AssetRow {
  pub path: String,
  /// Cached at install time rather than on first use
  pub core: bool,
  pub last: Option<AssetState>,
}

/// A message in the status bar
#[derive(Debug, Clone)]
pub struct StatusMessage {
  pub text: String,
  pub error: bool,
}

/// What is drawn on top of the asset list
#[derive(Debug, Default)]
pub struct Overlays {
  pub install_prompt: bool,
  pub update_banner: Option<CacheVersion>,
  pub offline: Option<String>,
}

/// Main application state: one page attached to the controller
pub struct App {
  controller: SiteController,
  page: Page,
  bridge: ClientBridge,

  /// Assets of the active deployment
  assets: Vec<AssetRow>,
  selected: usize,

  overlays: Overlays,
  status: Option<StatusMessage>,

  /// Page visibility, watched by the update poller
  visibility: watch::Sender<bool>,
  /// Polling stops when this is dropped
  _poller: Option<PollerHandle>,

  /// Event sender for async tasks
  event_tx: mpsc::UnboundedSender<Event>,

  /// Whether to quit
  should_quit: bool,
}

impl App {
  pub fn new(controller: SiteController, bridge: ClientBridge) -> Result<Self> {
    let page = controller.connect()?;
    let (tx, _rx) = mpsc::unbounded_channel();
    let (visibility, _) = watch::channel(true);

    let mut app = Self {
      controller,
      page,
      bridge,
      assets: Vec::new(),
      selected: 0,
      overlays: Overlays::default(),
      status: None,
      visibility,
      _poller: None,
      event_tx: tx,
      should_quit: false,
    };
    app.load_assets();
    Ok(app)
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableFocusChange)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create event handler
    let mut events = EventHandler::new(Duration::from_millis(250));
    self.event_tx = events.sender();

    self.start();

    // Main loop
    while !self.should_quit {
      // Draw UI
      terminal.draw(|frame| ui::draw(frame, self))?;

      // Handle events
      if let Some(event) = events.next().await {
        self.handle_event(event);
      }
    }

    // Cleanup terminal
    stdout().execute(DisableFocusChange)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
  }

  /// Page load: register (check for a deployment), start polling, offer install.
  fn start(&mut self) {
    self.check_for_update();

    self._poller = Some(UpdatePoller::spawn(
      self.controller.clone(),
      self.bridge.settings().update_interval,
      self.visibility.subscribe(),
    ));

    if let Err(e) = self.bridge.install_available(Utc::now()) {
      self.set_error(format!("Failed to read install state: {}", e));
    }
  }

  fn load_assets(&mut self) {
    let descriptor = match self.controller.active_descriptor() {
      Ok(Some(descriptor)) => descriptor,
      Ok(None) => DeploymentDescriptor::builtin(),
      Err(e) => {
        self.set_error(e.to_string());
        DeploymentDescriptor::builtin()
      }
    };

    self.assets = descriptor
      .core
      .paths()
      .iter()
      .map(|path| (path, true))
      .chain(descriptor.on_demand.paths().iter().map(|path| (path, false)))
      .map(|(path, core)| AssetRow {
        path: path.clone(),
        core,
        last: None,
      })
      .collect();
    self.selected = self.selected.min(self.assets.len().saturating_sub(1));
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Focus(visible) => {
        debug!(visible, "Page visibility changed");
        self.visibility.send_replace(visible);
      }
      Event::Tick => self.on_tick(),
      Event::Fetched(report) => self.on_fetched(report),
      Event::FetchFailed { path, error } => {
        if let Some(row) = self.assets.iter_mut().find(|row| row.path == path) {
          row.last = Some(AssetState::Failed(error.clone()));
        }
        let actions = self.bridge.connectivity_changed(false, Utc::now());
        self.apply(actions);
        self.set_error(format!("{}: {}", path, error));
      }
      Event::Status(text) => self.set_status(text),
      Event::Error(msg) => self.set_error(msg),
    }
  }

  fn on_tick(&mut self) {
    let now = Utc::now();
    let controlled = self.page.controlled_by().is_some();

    while let Some(event) = self.page.try_next_event() {
      self.describe(&event);
      match self
        .bridge
        .controller_event(&event, self.page.id(), controlled, now)
      {
        Ok(actions) => self.apply(actions),
        Err(e) => self.set_error(e.to_string()),
      }
      if matches!(event, ControllerEvent::ControllerChanged { .. }) {
        self.load_assets();
      }
    }

    let actions = self.bridge.tick(now);
    self.apply(actions);
  }

  /// Status-bar line for lifecycle events
  fn describe(&mut self, event: &ControllerEvent) {
    match event {
      ControllerEvent::UpdateFound { version } => {
        self.set_status(format!("Installing {}...", version))
      }
      ControllerEvent::StateChanged {
        version,
        state: InstanceState::Activated,
      } => self.set_status(format!("{} is active", version)),
      ControllerEvent::StateChanged {
        version,
        state: InstanceState::Redundant,
      } => debug!(version = %version, "Instance retired"),
      _ => {}
    }
  }

  fn on_fetched(&mut self, report: FetchReport) {
    if matches!(
      report.source,
      ResponseSource::Network | ResponseSource::Passthrough
    ) {
      let actions = self.bridge.connectivity_changed(true, Utc::now());
      self.apply(actions);
    }
    self.set_status(format!(
      "{} {} from {} ({} bytes)",
      report.path, report.status, report.source, report.bytes
    ));
    if let Some(row) = self.assets.iter_mut().find(|row| row.path == report.path) {
      row.last = Some(AssetState::Done(report));
    }
  }

  /// Carry out bridge actions; some of them lead to more.
  fn apply(&mut self, actions: Vec<BridgeAction>) {
    let mut queue: VecDeque<BridgeAction> = actions.into();

    while let Some(action) = queue.pop_front() {
      match action {
        BridgeAction::ShowInstallPrompt => self.overlays.install_prompt = true,
        BridgeAction::HideInstallPrompt => self.overlays.install_prompt = false,
        BridgeAction::RequestInstall => {
          // A terminal has no install dialog of its own; accepting is installing
          info!("Install accepted");
          match self.bridge.app_installed() {
            Ok(actions) => {
              queue.extend(actions);
              self.set_status("Installed. Pera nai Vai now works offline".to_string());
            }
            Err(e) => self.set_error(format!("Failed to save install state: {}", e)),
          }
        }
        BridgeAction::ShowUpdateBanner { version } => self.overlays.update_banner = Some(version),
        BridgeAction::HideUpdateBanner => self.overlays.update_banner = None,
        BridgeAction::PostMessage(message) => self.page.post_message(message),
        BridgeAction::Reload => self.reload(),
        BridgeAction::ShowOfflineIndicator { message } => self.overlays.offline = Some(message),
        BridgeAction::HideOfflineIndicator => self.overlays.offline = None,
      }
    }
  }

  /// Reconnect as a fresh page under the current controller.
  fn reload(&mut self) {
    match self.controller.connect() {
      Ok(page) => {
        self.page = page;
        self.load_assets();
        let version = self
          .page
          .controlled_by()
          .map(|v| v.to_string())
          .unwrap_or_else(|| "no controller".to_string());
        self.set_status(format!("Reloaded under {}", version));
      }
      Err(e) => self.set_error(format!("Reload failed: {}", e)),
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    match key.code {
      // Quit
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.should_quit = true;
      }

      // Navigation
      KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
      KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
      KeyCode::Enter => self.fetch_selected(),

      // Update banner
      KeyCode::Char('u') if self.overlays.update_banner.is_some() => {
        let actions = self.bridge.apply_update();
        self.apply(actions);
      }
      KeyCode::Char('l') if self.overlays.update_banner.is_some() => {
        match self.bridge.dismiss_update() {
          Ok(actions) => self.apply(actions),
          Err(e) => self.set_error(e.to_string()),
        }
      }

      // Install prompt
      KeyCode::Char('i') if self.overlays.install_prompt => {
        let actions = self.bridge.accept_install();
        self.apply(actions);
      }
      KeyCode::Char('m') if self.overlays.install_prompt => {
        match self.bridge.dismiss_install(Utc::now()) {
          Ok(actions) => self.apply(actions),
          Err(e) => self.set_error(e.to_string()),
        }
      }

      KeyCode::Char('r') => self.check_for_update(),
      KeyCode::Char('v') => self.request_version(),
      KeyCode::Char('t') => match self.bridge.toggle_theme() {
        Ok(theme) => self.set_status(format!("Theme: {}", theme)),
        Err(e) => self.set_error(format!("Failed to save theme: {}", e)),
      },
      _ => {}
    }
  }

  fn move_selection(&mut self, delta: i32) {
    let len = self.assets.len();
    if len > 0 {
      self.selected = (self.selected as i32 + delta).rem_euclid(len as i32) as usize;
    }
  }

  fn fetch_selected(&mut self) {
    let Some(row) = self.assets.get_mut(self.selected) else {
      return;
    };
    let url = match self.controller.settings().origin.join(&row.path) {
      Ok(url) => url,
      Err(e) => {
        let msg = format!("Bad asset path {}: {}", row.path, e);
        self.set_error(msg);
        return;
      }
    };
    row.last = Some(AssetState::Loading);

    let path = row.path.clone();
    let request = match Destination::from_path(&path) {
      Destination::Document => Request::navigate(url),
      _ => Request::get(url),
    };
    let controller = self.controller.clone();
    let client = self.page.id();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let event = match controller.fetch_for(client, request).await {
        Ok(outcome) => Event::Fetched(FetchReport {
          path,
          status: outcome.response.status,
          source: outcome.source,
          bytes: outcome.response.body.len(),
        }),
        Err(e) => Event::FetchFailed {
          path,
          error: e.to_string(),
        },
      };
      let _ = tx.send(event);
    });
  }

  fn check_for_update(&self) {
    let controller = self.controller.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let event = match controller.update().await {
        Ok(UpdateOutcome::UpToDate(version)) => {
          Event::Status(format!("Up to date ({})", version))
        }
        Ok(UpdateOutcome::Installed(version)) => {
          Event::Status(format!("{} installed, waiting", version))
        }
        Ok(UpdateOutcome::Activated(version)) => {
          Event::Status(format!("{} installed and active", version))
        }
        Ok(UpdateOutcome::InstallFailed { version, reason }) => {
          Event::Error(format!("Install of {} failed: {}", version, reason))
        }
        Err(e) => {
          warn!(error = %e, "Update check failed");
          Event::Error(format!("Update check failed: {}", e))
        }
      };
      let _ = tx.send(event);
    });
  }

  fn request_version(&self) {
    let controller = self.controller.clone();
    let tx = self.event_tx.clone();

    tokio::spawn(async move {
      let (envelope, reply) = Envelope::request(ControlMessage::GetVersion);
      let event = match controller.dispatch(envelope).await {
        Ok(()) => match reply.await {
          Ok(reply) => Event::Status(format!("Controller version: {}", reply.version)),
          Err(_) => Event::Status("No active controller".to_string()),
        },
        Err(e) => Event::Error(e.to_string()),
      };
      let _ = tx.send(event);
    });
  }

  fn set_status(&mut self, text: String) {
    self.status = Some(StatusMessage { text, error: false });
  }

  fn set_error(&mut self, text: String) {
    warn!(error = %text, "Shown in status bar");
    self.status = Some(StatusMessage { text, error: true });
  }

  // Accessors for the UI

  pub fn origin(&self) -> &str {
    self.controller.settings().origin.as_str()
  }

  pub fn controlled_by(&self) -> Option<CacheVersion> {
    self.page.controlled_by()
  }

  pub fn theme(&self) -> Theme {
    self.bridge.theme()
  }

  pub fn assets(&self) -> &[AssetRow] {
    &self.assets
  }

  pub fn selected(&self) -> usize {
    self.selected
  }

  pub fn overlays(&self) -> &Overlays {
    &self.overlays
  }

  pub fn status(&self) -> Option<&StatusMessage> {
    self.status.as_ref()
  }

  pub fn is_online(&self) -> bool {
    self.bridge.is_online()
  }
}
