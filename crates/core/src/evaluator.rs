//! Delay evaluation against the notification watermark.
//!
//! Pure logic. The caller fetches the current delay and passes in the
//! current [`MonitorState`]; nothing is mutated here.

use serde::Serialize;

use crate::config::MonitorConfig;
use crate::state::MonitorState;
use crate::types::Minutes;

/// What a single reading calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Delay crossed the threshold for the first time, or grew by at least
    /// the notify delta since the last notice.
    Escalate,
    /// Delay dropped back under the threshold after an escalation.
    Clear,
    NoChange,
}

/// Evaluate one delay reading.
///
/// - `Escalate` iff `delay >= threshold` and `delay >= watermark + delta`.
/// - `Clear` iff an over-threshold notice is outstanding and `delay < threshold`.
///
/// The two are mutually exclusive: escalation needs `delay >= threshold`,
/// which rules out the clear condition.
pub fn evaluate(delay_minutes: Minutes, config: &MonitorConfig, state: &MonitorState) -> Decision {
    let threshold = config.threshold_minutes;

    if delay_minutes >= threshold
        && delay_minutes >= state.highest_notified_delay_minutes + config.notify_delta_minutes
    {
        return Decision::Escalate;
    }

    if state.has_notified_over_threshold && delay_minutes < threshold {
        return Decision::Clear;
    }

    Decision::NoChange
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
