//! Mutable per-instance monitor state.

use serde::Serialize;

use crate::types::Minutes;

/// State owned by exactly one monitor instance.
///
/// Watermark fields are written only by [`crate::debouncer`] and the
/// route-restart signal; signal fields only by [`crate::signals`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorState {
    pub(crate) highest_notified_delay_minutes: Minutes,
    pub(crate) has_notified_over_threshold: bool,
    pub(crate) notification_sequence: u64,
    pub(crate) pending_snooze_ms: Option<u64>,
    pub(crate) check_now_requested: bool,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest delay already communicated in the current episode.
    pub fn highest_notified_delay_minutes(&self) -> Minutes {
        self.highest_notified_delay_minutes
    }

    /// True while an escalation has been sent and no all-clear since.
    pub fn has_notified_over_threshold(&self) -> bool {
        self.has_notified_over_threshold
    }

    pub fn notification_sequence(&self) -> u64 {
        self.notification_sequence
    }

    pub fn pending_snooze_ms(&self) -> Option<u64> {
        self.pending_snooze_ms
    }

    pub fn check_now_requested(&self) -> bool {
        self.check_now_requested
    }
}
