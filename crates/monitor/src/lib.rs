//! Host runtime for delivery monitors.
//!
//! Drives [`delaywatch_core::Monitor`] state machines on tokio:
//!
//! - [`runner`]: one task per instance: timers, signal mailbox, cancellation.
//! - [`retry`]: bounded exponential backoff around collaborator calls.
//! - [`registry`]: start / signal / status / cancel by [`InstanceId`].
//! - `fakes`: in-memory collaborators for tests (`test-util` feature).
//!
//! [`InstanceId`]: delaywatch_core::InstanceId

pub mod collaborators;
#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod settings;
pub mod snapshot;

pub use collaborators::Collaborators;
pub use registry::{MonitorRegistry, RegistryError};
pub use settings::MonitorSettings;
pub use snapshot::{InstanceStatus, MonitorSnapshot};
