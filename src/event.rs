use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use pnv::cache::ResponseSource;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of fetching one asset through the page
#[derive(Debug, Clone)]
pub struct FetchReport {
  pub path: String,
  pub status: u16,
  pub source: ResponseSource,
  pub bytes: usize,
}

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal gained (true) or lost (false) focus
  Focus(bool),
  /// Periodic tick for UI refresh and bridge timers
  Tick,
  /// An asset fetch finished
  Fetched(FetchReport),
  /// An asset fetch failed at the network
  FetchFailed { path: String, error: String },
  /// Informational status-bar message
  Status(String),
  /// Error for the status bar
  Error(String),
}

/// Event handler that produces events from terminal input and a tick timer
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let reader_tx = tx.clone();

    // Crossterm polling blocks, keep it off the runtime workers
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) => Some(Event::Key(key)),
          Ok(CrosstermEvent::FocusGained) => Some(Event::Focus(true)),
          Ok(CrosstermEvent::FocusLost) => Some(Event::Focus(false)),
          _ => None,
        }
      } else {
        Some(Event::Tick)
      };

      if let Some(event) = event {
        if reader_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Sender for background tasks to report back on
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
