//! Control signals delivered to a running monitor.
//!
//! Handlers are plain state updates: no I/O, no suspension. Each signal
//! writes only its own field(s), so any interleaving of signals delivered
//! before the next cycle reads them gives the same result.

use serde::{Deserialize, Serialize};

use crate::state::MonitorState;

const MS_PER_MINUTE: u64 = 60_000;

/// An externally delivered command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// Replace the next wait with `minutes` (one shot, last write wins).
    Snooze { minutes: f64 },
    /// The delivery took a new route; forget the delay history.
    RouteRestarted,
    /// Run the next cycle without waiting.
    CheckNow,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Snooze { .. } => "snooze",
            Signal::RouteRestarted => "route_restarted",
            Signal::CheckNow => "check_now",
        }
    }
}

/// Apply a signal to the monitor state.
pub fn apply(state: &mut MonitorState, signal: Signal) {
    match signal {
        Signal::Snooze { minutes } => {
            state.pending_snooze_ms = Some(snooze_ms(minutes));
        }
        Signal::RouteRestarted => {
            // The over-threshold flag is left alone on purpose.
            state.highest_notified_delay_minutes = 0;
        }
        Signal::CheckNow => {
            state.check_now_requested = true;
        }
    }
}

/// `max(0, floor(minutes)) * 60000`. Non-finite input snoozes for zero.
pub fn snooze_ms(minutes: f64) -> u64 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0;
    }
    // Saturating float-to-int cast.
    (minutes.floor() as u64).saturating_mul(MS_PER_MINUTE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
