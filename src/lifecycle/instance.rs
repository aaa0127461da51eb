//! One version of the controller and its lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::CacheVersion;
use crate::error::{Error, Result};
use crate::manifest::DeploymentDescriptor;

/// Lifecycle state of a controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
  /// Core assets are being fetched into a fresh bucket
  Installing,
  /// Bucket fully populated, waiting to take over
  Installed,
  /// Stale buckets are being removed
  Activating,
  /// Serving fetches
  Activated,
  /// Failed to install or superseded
  Redundant,
}

impl InstanceState {
  /// Whether `self -> to` is a legal lifecycle step.
  pub fn can_transition(self, to: InstanceState) -> bool {
    use InstanceState::*;
    matches!(
      (self, to),
      (Installing, Installed)
        | (Installing, Redundant)
        | (Installed, Activating)
        | (Installed, Redundant)
        | (Activating, Activated)
        | (Activating, Redundant)
        | (Activated, Redundant)
    )
  }
}

impl fmt::Display for InstanceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Installing => write!(f, "installing"),
      Self::Installed => write!(f, "installed"),
      Self::Activating => write!(f, "activating"),
      Self::Activated => write!(f, "activated"),
      Self::Redundant => write!(f, "redundant"),
    }
  }
}

/// Identity of one controller instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub(crate) u64);

impl fmt::Display for InstanceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// One deployment's controller logic, moving through the lifecycle states.
#[derive(Debug, Clone)]
pub struct ControllerInstance {
  id: InstanceId,
  descriptor: DeploymentDescriptor,
  state: InstanceState,
  skip_waiting: bool,
}

impl ControllerInstance {
  pub(crate) fn new(id: InstanceId, descriptor: DeploymentDescriptor) -> Self {
    Self {
      id,
      descriptor,
      state: InstanceState::Installing,
      skip_waiting: false,
    }
  }

  /// An instance restored from a bucket that was already active.
  pub(crate) fn restored(id: InstanceId, descriptor: DeploymentDescriptor) -> Self {
    Self {
      id,
      descriptor,
      state: InstanceState::Activated,
      skip_waiting: false,
    }
  }

  pub fn id(&self) -> InstanceId {
    self.id
  }

  pub fn version(&self) -> &CacheVersion {
    &self.descriptor.version
  }

  pub fn descriptor(&self) -> &DeploymentDescriptor {
    &self.descriptor
  }

  pub fn state(&self) -> InstanceState {
    self.state
  }

  pub fn skip_waiting(&self) -> bool {
    self.skip_waiting
  }

  pub(crate) fn request_skip_waiting(&mut self) {
    self.skip_waiting = true;
  }

  pub(crate) fn transition(&mut self, to: InstanceState) -> Result<()> {
    if !self.state.can_transition(to) {
      return Err(Error::InvalidTransition {
        from: self.state,
        to,
      });
    }
    self.state = to;
    Ok(())
  }
}
