use std::fmt;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::controller::{Controller, ControllerEvent};
use crate::cache::{CacheStore, CacheVersion};
use crate::error::Result;
use crate::interceptor::FetchOutcome;
use crate::messages::{ControlMessage, Envelope};
use crate::network::{Network, Request};

/// Identifies one connected page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub(crate) u64);

impl fmt::Display for ClientId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "client-{}", self.0)
  }
}

/// A page's connection to the controller.
///
/// Requests made through the connection are intercepted only while the page is
/// controlled. Dropping the connection closes the page.
pub struct ClientConnection<S: CacheStore, N: Network> {
  id: ClientId,
  controller: Controller<S, N>,
  events: broadcast::Receiver<ControllerEvent>,
}

impl<S: CacheStore, N: Network> ClientConnection<S, N> {
  pub(crate) fn new(
    id: ClientId,
    controller: Controller<S, N>,
    events: broadcast::Receiver<ControllerEvent>,
  ) -> Self {
    Self {
      id,
      controller,
      events,
    }
  }

  pub fn id(&self) -> ClientId {
    self.id
  }

  /// Version of the instance controlling this page, if any.
  pub fn controlled_by(&self) -> Option<CacheVersion> {
    self.controller.controller_of(self.id).ok().flatten()
  }

  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    self.controller.fetch_for(self.id, request).await
  }

  /// Fire-and-forget message to the controller.
  pub fn post_message(&self, message: ControlMessage) {
    let controller = self.controller.clone();
    tokio::spawn(async move {
      if let Err(e) = controller.dispatch(Envelope::post(message)).await {
        warn!(error = %e, "Control message failed");
      }
    });
  }

  /// Ask the controller which version is active.
  pub async fn get_version(&self) -> Option<String> {
    let (envelope, reply) = Envelope::request(ControlMessage::GetVersion);
    if let Err(e) = self.controller.dispatch(envelope).await {
      warn!(error = %e, "GET_VERSION failed");
      return None;
    }
    reply.await.ok().map(|r| r.version)
  }

  /// Next lifecycle event, if one is queued.
  pub fn try_next_event(&mut self) -> Option<ControllerEvent> {
    loop {
      match self.events.try_recv() {
        Ok(event) => return Some(event),
        Err(broadcast::error::TryRecvError::Lagged(n)) => {
          debug!(client = %self.id, skipped = n, "Event receiver lagged");
        }
        Err(_) => return None,
      }
    }
  }

  /// Wait for the next lifecycle event.
  pub async fn next_event(&mut self) -> Option<ControllerEvent> {
    loop {
      match self.events.recv().await {
        Ok(event) => return Some(event),
        Err(broadcast::error::RecvError::Lagged(n)) => {
          debug!(client = %self.id, skipped = n, "Event receiver lagged");
        }
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    }
  }
}

impl<S: CacheStore, N: Network> Drop for ClientConnection<S, N> {
  fn drop(&mut self) {
    self.controller.detach(self.id);
  }
}
