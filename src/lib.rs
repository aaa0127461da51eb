//! Offline asset cache and update controller for the Pera nai Vai tool site.
//!
//! A [`lifecycle::Controller`] installs each deployment into its own cache
//! bucket, serves same-origin requests from the active bucket with
//! stale-while-revalidate, and hands control to newer deployments once the
//! pages using the old one let go.

pub mod bridge;
pub mod cache;
pub mod error;
pub mod interceptor;
pub mod lifecycle;
pub mod manifest;
pub mod messages;
pub mod network;
pub mod revalidate;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
