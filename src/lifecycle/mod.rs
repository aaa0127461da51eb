//! Controller lifecycle: instances, registration and connected pages.

mod client;
mod controller;
mod instance;

pub use client::{ClientConnection, ClientId};
pub use controller::{
  ActivationReport, Controller, ControllerEvent, ControllerSettings, RegistrationSnapshot,
  UpdateOutcome, DEFAULT_DESCRIPTOR_PATH,
};
pub use instance::{ControllerInstance, InstanceId, InstanceState};
