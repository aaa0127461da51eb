//! The install / activate / claim state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::try_join_all;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

use super::client::{ClientConnection, ClientId};
use super::instance::{ControllerInstance, InstanceId, InstanceState};
use crate::cache::{CacheStore, CacheVersion, ResponseSource};
use crate::error::{Error, Result};
use crate::interceptor::{ActiveBucket, FetchInterceptor, FetchOutcome};
use crate::manifest::DeploymentDescriptor;
use crate::messages::{ControlMessage, Envelope, VersionReply};
use crate::network::{Network, Request};

/// Path the origin publishes its deployment descriptor under.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "/pnv-manifest.json";

const EVENT_CAPACITY: usize = 64;

/// Where the controller is registered and where it looks for updates.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
  /// Origin whose requests are intercepted (scope is always the origin root)
  pub origin: Url,
  pub descriptor_path: String,
}

impl ControllerSettings {
  pub fn new(origin: Url) -> Self {
    Self {
      origin,
      descriptor_path: DEFAULT_DESCRIPTOR_PATH.to_string(),
    }
  }

  pub fn with_descriptor_path(mut self, path: impl Into<String>) -> Self {
    self.descriptor_path = path.into();
    self
  }

  pub fn descriptor_url(&self) -> Result<Url> {
    Ok(self.origin.join(&self.descriptor_path)?)
  }
}

/// Lifecycle notifications broadcast to every connected page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
  /// A new instance started installing
  UpdateFound { version: CacheVersion },
  /// An instance moved to a new lifecycle state
  StateChanged {
    version: CacheVersion,
    state: InstanceState,
  },
  /// The listed clients are now controlled by `version`
  ControllerChanged {
    version: CacheVersion,
    clients: Vec<ClientId>,
  },
}

/// Result of an update check or install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
  /// Nothing new: the version is already active, waiting or installing
  UpToDate(CacheVersion),
  /// Installed and waiting for the old instance to let go
  Installed(CacheVersion),
  /// Installed and activated straight away
  Activated(CacheVersion),
  /// Install failed; the previous instance keeps serving
  InstallFailed {
    version: CacheVersion,
    reason: String,
  },
}

/// What an activation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  pub version: CacheVersion,
  /// Stale buckets that were removed
  pub deleted: Vec<CacheVersion>,
  /// Stale buckets that could not be removed (retried on the next activation)
  pub failed: Vec<CacheVersion>,
  /// Clients that switched to this version
  pub claimed: usize,
}

/// Point-in-time view of the registration, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSnapshot {
  pub installing: Option<(CacheVersion, InstanceState)>,
  pub waiting: Option<(CacheVersion, InstanceState)>,
  pub active: Option<(CacheVersion, InstanceState)>,
  pub clients: usize,
}

type ControllerRef = (InstanceId, CacheVersion);

#[derive(Default)]
struct Registration {
  installing: Option<ControllerInstance>,
  waiting: Option<ControllerInstance>,
  active: Option<ControllerInstance>,
  /// Every connected client and the instance controlling it
  clients: HashMap<ClientId, Option<ControllerRef>>,
}

impl Registration {
  fn knows(&self, version: &CacheVersion) -> bool {
    [&self.installing, &self.waiting, &self.active]
      .into_iter()
      .flatten()
      .any(|instance| instance.version() == version)
  }

  fn active_has_clients(&self) -> bool {
    let Some(active) = &self.active else {
      return false;
    };
    self
      .clients
      .values()
      .any(|c| matches!(c, Some((id, _)) if *id == active.id()))
  }

  /// Whether the waiting instance may take over now.
  fn waiting_can_activate(&self) -> bool {
    match &self.waiting {
      Some(waiting) => {
        self.active.is_none() || waiting.skip_waiting() || !self.active_has_clients()
      }
      None => false,
    }
  }
}

fn summarize(instance: &Option<ControllerInstance>) -> Option<(CacheVersion, InstanceState)> {
  instance
    .as_ref()
    .map(|i| (i.version().clone(), i.state()))
}

struct Inner<S: CacheStore, N: Network> {
  store: Arc<S>,
  network: Arc<N>,
  settings: ControllerSettings,
  interceptor: FetchInterceptor<S, N>,
  registration: Mutex<Registration>,
  /// Serializes install and activate jobs
  jobs: tokio::sync::Mutex<()>,
  events: broadcast::Sender<ControllerEvent>,
  next_instance: AtomicU64,
  next_client: AtomicU64,
}

/// Offline cache controller for one origin.
///
/// Cheap to clone; clones share the same registration. Pages attach through
/// [`Controller::connect`] and talk to it with [`ControlMessage`]s.
pub struct Controller<S: CacheStore, N: Network> {
  inner: Arc<Inner<S, N>>,
}

impl<S: CacheStore, N: Network> Clone for Controller<S, N> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: CacheStore, N: Network> Controller<S, N> {
  pub fn new(store: Arc<S>, network: Arc<N>, settings: ControllerSettings) -> Self {
    let interceptor = FetchInterceptor::new(
      Arc::clone(&store),
      Arc::clone(&network),
      settings.origin.clone(),
    );
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    Self {
      inner: Arc::new(Inner {
        store,
        network,
        settings,
        interceptor,
        registration: Mutex::new(Registration::default()),
        jobs: tokio::sync::Mutex::new(()),
        events,
        next_instance: AtomicU64::new(1),
        next_client: AtomicU64::new(1),
      }),
    }
  }

  pub fn settings(&self) -> &ControllerSettings {
    &self.inner.settings
  }

  pub fn store(&self) -> &Arc<S> {
    &self.inner.store
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
    self.inner.events.subscribe()
  }

  fn registration(&self) -> Result<MutexGuard<'_, Registration>> {
    self
      .inner
      .registration
      .lock()
      .map_err(|e| Error::storage(format!("Registration lock poisoned: {}", e)))
  }

  fn emit(&self, event: ControllerEvent) {
    // No subscribers is fine
    let _ = self.inner.events.send(event);
  }

  fn next_instance_id(&self) -> InstanceId {
    InstanceId(self.inner.next_instance.fetch_add(1, Ordering::SeqCst))
  }

  // ==========================================================================
  // Registration
  // ==========================================================================

  /// Re-adopt the newest fully installed bucket as the active instance.
  ///
  /// Buckets carry the descriptor they were installed from; a bucket without
  /// one never finished installing and is skipped.
  pub fn restore(&self) -> Result<Option<CacheVersion>> {
    if let Some(active) = self.active_version()? {
      return Ok(Some(active));
    }

    let mut found = None;
    for bucket in self.inner.store.keys()?.into_iter().rev() {
      let Some(note) = self.inner.store.annotation(&bucket)? else {
        continue;
      };
      match DeploymentDescriptor::from_json(note.as_bytes()) {
        Ok(descriptor) if descriptor.version == bucket => {
          found = Some(descriptor);
          break;
        }
        Ok(descriptor) => {
          warn!(bucket = %bucket, version = %descriptor.version, "Bucket descriptor does not match its name");
        }
        Err(e) => warn!(bucket = %bucket, error = %e, "Unreadable bucket descriptor"),
      }
    }

    let Some(descriptor) = found else {
      return Ok(None);
    };

    let version = descriptor.version.clone();
    let id = self.next_instance_id();
    let mut guard = self.registration()?;
    let reg = &mut *guard;
    reg.active = Some(ControllerInstance::restored(id, descriptor));
    for controller in reg.clients.values_mut() {
      *controller = Some((id, version.clone()));
    }
    info!(version = %version, "Restored active cache");
    Ok(Some(version))
  }

  /// Attach a page. A page opened while an instance is active is controlled by it.
  pub fn connect(&self) -> Result<ClientConnection<S, N>> {
    let events = self.subscribe();
    let id = ClientId(self.inner.next_client.fetch_add(1, Ordering::SeqCst));

    let mut reg = self.registration()?;
    let controller = reg.active.as_ref().map(|a| (a.id(), a.version().clone()));
    reg.clients.insert(id, controller);
    debug!(client = %id, "Client connected");

    Ok(ClientConnection::new(id, self.clone(), events))
  }

  /// Detach a page; a waiting instance may now be free to activate.
  pub(crate) fn detach(&self, id: ClientId) {
    let waiting = match self.inner.registration.lock() {
      Ok(mut reg) => {
        reg.clients.remove(&id);
        reg.waiting.is_some()
      }
      Err(_) => return,
    };
    debug!(client = %id, "Client disconnected");

    if !waiting {
      return;
    }
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
      let controller = self.clone();
      runtime.spawn(async move {
        let _job = controller.inner.jobs.lock().await;
        if let Err(e) = controller.try_activate_locked() {
          warn!(error = %e, "Activation after client detach failed");
        }
      });
    }
  }

  /// Version controlling a client, if any.
  pub fn controller_of(&self, id: ClientId) -> Result<Option<CacheVersion>> {
    let reg = self.registration()?;
    Ok(
      reg
        .clients
        .get(&id)
        .cloned()
        .flatten()
        .map(|(_, version)| version),
    )
  }

  // ==========================================================================
  // Update and install
  // ==========================================================================

  /// Check the origin for a new deployment and install it if there is one.
  pub async fn update(&self) -> Result<UpdateOutcome> {
    let url = self.inner.settings.descriptor_url()?;
    let response = self.inner.network.fetch(&Request::get(url.clone())).await?;
    if response.status != 200 {
      return Err(Error::network(
        url.as_str(),
        format!("HTTP {}", response.status),
      ));
    }

    let descriptor = DeploymentDescriptor::from_json(&response.body)?;
    if self.registration()?.knows(&descriptor.version) {
      debug!(version = %descriptor.version, "Already up to date");
      return Ok(UpdateOutcome::UpToDate(descriptor.version));
    }

    self.install(descriptor).await
  }

  /// Install a deployment into a fresh bucket.
  ///
  /// Failure is contained: the instance is discarded, the partial bucket is
  /// removed and the previously active instance keeps serving.
  pub async fn install(&self, descriptor: DeploymentDescriptor) -> Result<UpdateOutcome> {
    let _job = self.inner.jobs.lock().await;
    let version = descriptor.version.clone();

    {
      let mut reg = self.registration()?;
      if reg.knows(&version) {
        return Ok(UpdateOutcome::UpToDate(version));
      }
      reg.installing = Some(ControllerInstance::new(
        self.next_instance_id(),
        descriptor.clone(),
      ));
    }

    info!(version = %version, "Installing");
    self.emit(ControllerEvent::UpdateFound {
      version: version.clone(),
    });
    self.emit(ControllerEvent::StateChanged {
      version: version.clone(),
      state: InstanceState::Installing,
    });

    let result = self.provision(&descriptor).await;

    let superseded = {
      let mut reg = self.registration()?;
      let mut instance = reg
        .installing
        .take()
        .ok_or_else(|| Error::storage("installing instance vanished"))?;

      if let Err(e) = result {
        instance.transition(InstanceState::Redundant)?;
        drop(reg);
        error!(version = %version, error = %e, "Install failed");
        self.emit(ControllerEvent::StateChanged {
          version: version.clone(),
          state: InstanceState::Redundant,
        });
        return Ok(UpdateOutcome::InstallFailed {
          version,
          reason: e.to_string(),
        });
      }

      instance.transition(InstanceState::Installed)?;
      match reg.waiting.replace(instance) {
        Some(mut old) => {
          old.transition(InstanceState::Redundant)?;
          Some(old.version().clone())
        }
        None => None,
      }
    };

    if let Some(old) = superseded {
      info!(version = %old, "Waiting instance superseded");
      self.emit(ControllerEvent::StateChanged {
        version: old,
        state: InstanceState::Redundant,
      });
    }
    info!(version = %version, "Core files cached successfully");
    self.emit(ControllerEvent::StateChanged {
      version: version.clone(),
      state: InstanceState::Installed,
    });

    match self.try_activate_locked()? {
      Some(report) => Ok(UpdateOutcome::Activated(report.version)),
      None => Ok(UpdateOutcome::Installed(version)),
    }
  }

  async fn provision(&self, descriptor: &DeploymentDescriptor) -> Result<()> {
    let store = &self.inner.store;
    let bucket = &descriptor.version;

    let existed = store.has(bucket)?;
    store.open(bucket)?;

    let result = self.populate(descriptor).await;
    if result.is_err() && !existed {
      if let Err(e) = store.delete(bucket) {
        warn!(bucket = %bucket, error = %e, "Failed to remove partial bucket");
      }
    }
    result
  }

  /// Fetch every core asset, then write them all in one transaction.
  async fn populate(&self, descriptor: &DeploymentDescriptor) -> Result<()> {
    debug!(version = %descriptor.version, count = descriptor.core.len(), "Caching core files");
    let urls = descriptor.core.resolve(&self.inner.settings.origin)?;

    let fetches = urls.into_iter().map(|url| {
      let network = Arc::clone(&self.inner.network);
      let version = descriptor.version.to_string();
      async move {
        let request = Request::get(url);
        let response = network
          .fetch(&request)
          .await
          .map_err(|e| Error::Install {
            version: version.clone(),
            url: request.url.to_string(),
            reason: e.to_string(),
          })?;
        if !response.is_cacheable() {
          return Err(Error::Install {
            version,
            url: request.url.to_string(),
            reason: format!("HTTP {}", response.status),
          });
        }
        Ok((request.cache_key(), response))
      }
    });

    let entries = try_join_all(fetches).await?;
    self
      .inner
      .store
      .put_all(&descriptor.version, &entries)?;
    self
      .inner
      .store
      .annotate(&descriptor.version, &serde_json::to_string(descriptor)?)
  }

  // ==========================================================================
  // Activation
  // ==========================================================================

  /// Ask the waiting (or still installing) instance to take over as soon as it can.
  pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>> {
    {
      let mut reg = self.registration()?;
      if let Some(waiting) = reg.waiting.as_mut() {
        waiting.request_skip_waiting();
      } else if let Some(installing) = reg.installing.as_mut() {
        installing.request_skip_waiting();
      } else {
        debug!("skip_waiting with nothing waiting");
      }
    }

    let _job = self.inner.jobs.lock().await;
    self.try_activate_locked()
  }

  /// Promote the waiting instance, or with none waiting re-run stale bucket
  /// cleanup and claiming for the active one.
  pub async fn activate(&self) -> Result<ActivationReport> {
    let _job = self.inner.jobs.lock().await;
    self.activate_locked()
  }

  fn try_activate_locked(&self) -> Result<Option<ActivationReport>> {
    if !self.registration()?.waiting_can_activate() {
      return Ok(None);
    }
    self.activate_locked().map(Some)
  }

  fn activate_locked(&self) -> Result<ActivationReport> {
    let mut events = Vec::new();

    let (version, promoted) = {
      let mut reg = self.registration()?;
      match reg.waiting.take() {
        Some(mut next) => {
          next.transition(InstanceState::Activating)?;
          if let Some(mut old) = reg.active.take() {
            old.transition(InstanceState::Redundant)?;
            info!(version = %old.version(), "Retired previous instance");
            events.push(ControllerEvent::StateChanged {
              version: old.version().clone(),
              state: InstanceState::Redundant,
            });
          }
          let version = next.version().clone();
          let id = next.id();
          events.push(ControllerEvent::StateChanged {
            version: version.clone(),
            state: InstanceState::Activating,
          });
          reg.active = Some(next);
          (version, Some(id))
        }
        None => match &reg.active {
          Some(active) => (active.version().clone(), None),
          None => return Err(Error::NoActiveController),
        },
      }
    };
    for event in events.drain(..) {
      self.emit(event);
    }

    info!(version = %version, "Activating");
    let (deleted, failed) = self.delete_stale_buckets(&version);

    let claimed = {
      let mut guard = self.registration()?;
      let reg = &mut *guard;
      let active = reg.active.as_mut().ok_or(Error::NoActiveController)?;
      let active_id = active.id();

      // A newer activation may have run while buckets were being deleted
      if promoted == Some(active_id) {
        active.transition(InstanceState::Activated)?;
        events.push(ControllerEvent::StateChanged {
          version: version.clone(),
          state: InstanceState::Activated,
        });
      }

      let mut claimed: Vec<ClientId> = reg
        .clients
        .iter_mut()
        .filter(|(_, controller)| !matches!(controller, Some((id, _)) if *id == active_id))
        .map(|(client, controller)| {
          *controller = Some((active_id, version.clone()));
          *client
        })
        .collect();
      claimed.sort();
      claimed
    };

    if !claimed.is_empty() {
      info!(version = %version, clients = claimed.len(), "Claimed clients");
      self.emit(ControllerEvent::ControllerChanged {
        version: version.clone(),
        clients: claimed.clone(),
      });
    }
    for event in events {
      self.emit(event);
    }

    Ok(ActivationReport {
      version,
      deleted,
      failed,
      claimed: claimed.len(),
    })
  }

  /// Delete every bucket except `current`. Failures are logged and left for
  /// the next activation.
  fn delete_stale_buckets(&self, current: &CacheVersion) -> (Vec<CacheVersion>, Vec<CacheVersion>) {
    let names = match self.inner.store.keys() {
      Ok(names) => names,
      Err(e) => {
        error!(error = %e, "Failed to list cache buckets");
        return (Vec::new(), Vec::new());
      }
    };

    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    for name in names.into_iter().filter(|name| name != current) {
      info!(bucket = %name, "Deleting old cache");
      match self.inner.store.delete(&name) {
        Ok(_) => deleted.push(name),
        Err(e) => {
          warn!(bucket = %name, error = %e, "Failed to delete old cache");
          failed.push(name);
        }
      }
    }
    (deleted, failed)
  }

  // ==========================================================================
  // Fetch and messages
  // ==========================================================================

  /// Route a request through the active bucket, or straight to the network
  /// when it is not intercepted or nothing is active yet.
  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    if !self.inner.interceptor.intercepts(&request) {
      return self.passthrough(request).await;
    }

    match self.active_bucket()? {
      Some(bucket) => self.inner.interceptor.handle(&bucket, request).await,
      None => self.passthrough(request).await,
    }
  }

  /// Fetch on behalf of a page. Pages that are not controlled bypass the cache.
  pub async fn fetch_for(&self, client: ClientId, request: Request) -> Result<FetchOutcome> {
    if self.controller_of(client)?.is_none() {
      return self.passthrough(request).await;
    }
    self.fetch(request).await
  }

  async fn passthrough(&self, request: Request) -> Result<FetchOutcome> {
    let response = self.inner.network.fetch(&request).await?;
    Ok(FetchOutcome::new(response, ResponseSource::Passthrough))
  }

  fn active_bucket(&self) -> Result<Option<ActiveBucket>> {
    let reg = self.registration()?;
    match &reg.active {
      Some(active) => Ok(Some(ActiveBucket {
        version: active.version().clone(),
        offline_document: self
          .inner
          .settings
          .origin
          .join(&active.descriptor().offline_document)?,
      })),
      None => Ok(None),
    }
  }

  /// Handle a control message from a page.
  pub async fn dispatch(&self, envelope: Envelope) -> Result<()> {
    match envelope.message {
      ControlMessage::SkipWaiting => {
        info!("Received SKIP_WAITING message");
        self.skip_waiting().await?;
      }
      ControlMessage::GetVersion => match (self.active_version()?, envelope.reply) {
        (Some(version), Some(reply)) => {
          let _ = reply.send(VersionReply {
            version: version.to_string(),
          });
        }
        (None, _) => debug!("GET_VERSION with no active instance"),
        (_, None) => debug!("GET_VERSION without a reply channel"),
      },
    }
    Ok(())
  }

  // ==========================================================================
  // Accessors
  // ==========================================================================

  pub fn active_version(&self) -> Result<Option<CacheVersion>> {
    Ok(self.registration()?.active.as_ref().map(|a| a.version().clone()))
  }

  pub fn waiting_version(&self) -> Result<Option<CacheVersion>> {
    Ok(self.registration()?.waiting.as_ref().map(|w| w.version().clone()))
  }

  /// Descriptor of the active instance.
  pub fn active_descriptor(&self) -> Result<Option<DeploymentDescriptor>> {
    Ok(
      self
        .registration()?
        .active
        .as_ref()
        .map(|a| a.descriptor().clone()),
    )
  }

  pub fn snapshot(&self) -> Result<RegistrationSnapshot> {
    let reg = self.registration()?;
    Ok(RegistrationSnapshot {
      installing: summarize(&reg.installing),
      waiting: summarize(&reg.waiting),
      active: summarize(&reg.active),
      clients: reg.clients.len(),
    })
  }
}
