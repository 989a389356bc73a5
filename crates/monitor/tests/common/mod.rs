#![allow(dead_code)]

use std::time::Duration;

use chrono::NaiveDate;
use delaywatch_core::{InstanceId, MonitorConfig};
use delaywatch_monitor::fakes::FakeCollaborators;
use delaywatch_monitor::retry::RetryPolicy;
use delaywatch_monitor::{MonitorRegistry, MonitorSettings, MonitorSnapshot};

/// Interval between cycles used by most tests.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

pub fn creation_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// Threshold 30, delta 10.
pub fn config(delivery_id: &str) -> MonitorConfig {
    MonitorConfig {
        delivery_id: delivery_id.to_string(),
        origin: "Warehouse 7, Leeds".to_string(),
        destination: "12 High Street, York".to_string(),
        recipient_email: "dispatch@example.com".to_string(),
        threshold_minutes: 30,
        notify_delta_minutes: 10,
    }
}

pub fn settings(poll_interval: Duration) -> MonitorSettings {
    MonitorSettings {
        poll_interval,
        retry: RetryPolicy::default(),
    }
}

pub fn registry(fakes: &FakeCollaborators, poll_interval: Duration) -> MonitorRegistry {
    MonitorRegistry::new(fakes.collaborators(), settings(poll_interval))
}

/// Poll the registry once per simulated second until `cond` holds.
///
/// Panics after `max_secs` simulated seconds.
pub async fn wait_for(
    registry: &MonitorRegistry,
    id: &InstanceId,
    max_secs: u64,
    cond: impl Fn(&MonitorSnapshot) -> bool,
) -> MonitorSnapshot {
    for _ in 0..max_secs {
        let snapshot = registry.status(id).await.unwrap();
        if cond(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("condition not met within {max_secs}s for {id}");
}
