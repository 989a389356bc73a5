//! Notification debouncing: watermark bookkeeping and idempotency keys.
//!
//! [`on_escalate`] and [`on_clear`] take the next sequence number and return a
//! [`PendingNotice`]. The watermark only moves when the notice is committed
//! with [`PendingNotice::commit`], which the monitor does after the email
//! dispatch reports success. A failed dispatch therefore leaves the
//! watermark untouched while its key is never reused.

use std::fmt;

use serde::Serialize;

use crate::state::MonitorState;
use crate::types::Minutes;

// ---------------------------------------------------------------------------
// IdempotencyKey
// ---------------------------------------------------------------------------

/// `{delivery_id}-{sequence}`. Unique and strictly increasing within one
/// monitor instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    fn new(delivery_id: &str, sequence: u64) -> Self {
        Self(format!("{delivery_id}-{sequence}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PendingNotice
// ---------------------------------------------------------------------------

/// What the outbound message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoticeIntent {
    Escalation { delay_minutes: Minutes },
    AllClear,
}

/// A notice whose key has been issued but whose watermark effect has not
/// been applied yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotice {
    pub intent: NoticeIntent,
    pub sequence: u64,
    pub key: IdempotencyKey,
}

impl PendingNotice {
    /// Apply the watermark change for this notice.
    pub fn commit(&self, state: &mut MonitorState) {
        match self.intent {
            NoticeIntent::Escalation { delay_minutes } => {
                state.highest_notified_delay_minutes = delay_minutes;
                state.has_notified_over_threshold = true;
            }
            NoticeIntent::AllClear => {
                state.highest_notified_delay_minutes = 0;
                state.has_notified_over_threshold = false;
            }
        }
    }
}

/// Prepare an escalation notice for `delay_minutes`.
pub fn on_escalate(
    state: &mut MonitorState,
    delivery_id: &str,
    delay_minutes: Minutes,
) -> PendingNotice {
    issue(state, delivery_id, NoticeIntent::Escalation { delay_minutes })
}

/// Prepare an all-clear notice.
pub fn on_clear(state: &mut MonitorState, delivery_id: &str) -> PendingNotice {
    issue(state, delivery_id, NoticeIntent::AllClear)
}

fn issue(state: &mut MonitorState, delivery_id: &str, intent: NoticeIntent) -> PendingNotice {
    state.notification_sequence += 1;
    let sequence = state.notification_sequence;
    PendingNotice {
        intent,
        sequence,
        key: IdempotencyKey::new(delivery_id, sequence),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_increase_from_one() {
        let mut state = MonitorState::new();
        let first = on_escalate(&mut state, "d7", 35);
        let second = on_clear(&mut state, "d7");
        assert_eq!(first.key.as_str(), "d7-1");
        assert_eq!(second.key.as_str(), "d7-2");
        assert_eq!(state.notification_sequence(), 2);
    }

    #[test]
    fn issuing_does_not_touch_watermark() {
        let mut state = MonitorState::new();
        let _notice = on_escalate(&mut state, "d7", 35);
        assert_eq!(state.highest_notified_delay_minutes(), 0);
        assert!(!state.has_notified_over_threshold());
    }

    #[test]
    fn commit_escalation_raises_watermark() {
        let mut state = MonitorState::new();
        on_escalate(&mut state, "d7", 35).commit(&mut state);
        assert_eq!(state.highest_notified_delay_minutes(), 35);
        assert!(state.has_notified_over_threshold());
    }

    #[test]
    fn commit_clear_resets_watermark() {
        let mut state = MonitorState::new();
        on_escalate(&mut state, "d7", 50).commit(&mut state);
        on_clear(&mut state, "d7").commit(&mut state);
        assert_eq!(state.highest_notified_delay_minutes(), 0);
        assert!(!state.has_notified_over_threshold());
        assert_eq!(state.notification_sequence(), 2);
    }

    #[test]
    fn abandoned_notice_still_consumes_its_sequence() {
        let mut state = MonitorState::new();
        let abandoned = on_escalate(&mut state, "d7", 35);
        let retried = on_escalate(&mut state, "d7", 35);
        assert_ne!(abandoned.key, retried.key);
        assert_eq!(retried.sequence, 2);
    }
}
