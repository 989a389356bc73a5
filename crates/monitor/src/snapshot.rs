//! Read-only view of a monitor instance for status queries.

use chrono::Utc;
use delaywatch_core::monitor::{Phase, SleepKind};
use delaywatch_core::types::{Minutes, Timestamp};
use delaywatch_core::{InstanceId, Monitor, MonitorConfig, MonitorState};
use serde::Serialize;

/// Lifecycle of a monitor instance as seen by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    /// Stopped because the host shut down gracefully.
    Completed,
    /// The task died unexpectedly.
    Failed,
    /// Stopped by an explicit cancel request.
    Cancelled,
}

impl InstanceStatus {
    pub fn is_running(self) -> bool {
        self == InstanceStatus::Running
    }
}

/// Point-in-time copy of one instance's state.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
    pub phase: Phase,
    /// Set while the instance waits between checks.
    pub sleeping: Option<SleepKind>,
    pub config: MonitorConfig,
    pub state: MonitorState,
    pub last_delay_minutes: Option<Minutes>,
    pub last_checked_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub notifications_sent: u64,
    pub cycles_completed: u64,
    pub started_at: Timestamp,
}

impl MonitorSnapshot {
    /// Initial snapshot for a freshly started instance.
    pub fn starting(instance_id: InstanceId, monitor: &Monitor) -> Self {
        let mut snapshot = Self {
            instance_id,
            status: InstanceStatus::Running,
            phase: monitor.phase(),
            sleeping: monitor.sleep_kind(),
            config: monitor.config().clone(),
            state: monitor.state().clone(),
            last_delay_minutes: None,
            last_checked_at: None,
            last_error: None,
            notifications_sent: 0,
            cycles_completed: 0,
            started_at: Utc::now(),
        };
        snapshot.refresh(monitor);
        snapshot
    }

    /// Copy the monitor's current counters and state into the snapshot.
    pub fn refresh(&mut self, monitor: &Monitor) {
        self.phase = monitor.phase();
        self.sleeping = monitor.sleep_kind();
        self.state = monitor.state().clone();
        self.last_delay_minutes = monitor.last_delay_minutes();
        self.notifications_sent = monitor.notifications_sent();
        self.cycles_completed = monitor.cycles_completed();
    }
}
