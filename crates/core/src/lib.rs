//! Delivery delay monitoring domain.
//!
//! Pure logic with no I/O. The per-delivery monitoring state machine lives
//! here together with the pieces it is composed of:
//!
//! - [`evaluator`]: decides escalate / clear / no-change for one reading.
//! - [`debouncer`]: watermark bookkeeping and idempotency keys.
//! - [`signals`]: control signals (snooze, route restart, check now).
//! - [`monitor`]: the resumable cycle state machine driven by a host.
//! - [`activities`]: traits for the traffic, message and email collaborators.

pub mod activities;
pub mod config;
pub mod debouncer;
pub mod error;
pub mod evaluator;
pub mod monitor;
pub mod signals;
pub mod state;
pub mod types;

pub use config::{InstanceId, MonitorConfig};
pub use error::CoreError;
pub use monitor::{Monitor, Outcome, Phase, SleepKind, Step};
pub use signals::Signal;
pub use state::MonitorState;
