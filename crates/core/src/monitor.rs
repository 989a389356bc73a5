//! Per-delivery monitor loop as a resumable state machine.
//!
//! The monitor performs no I/O and never sleeps. A host repeatedly asks it
//! for the next [`Step`] with [`Monitor::poll`], performs that effect (sleep,
//! traffic lookup, message generation, email dispatch) and feeds the result
//! back through [`Monitor::complete`]. Signals are applied between steps with
//! [`Monitor::apply_signal`]. Because all state lives in this struct, a host
//! can checkpoint it between any two steps.
//!
//! # Cycle
//!
//! ```text
//!  CycleStart ──snooze pending, no check-now──► Sleeping(Snooze) ──┐
//!      │  ▲                                                        │
//!      │  └────────────────────────────────────────────────────────┘
//!      ▼
//!  Fetching ──NoChange / error──────────────────────────┐
//!      │ Escalate            │ Clear                     │
//!      ▼                     ▼                           │
//!  Writing ──ok──► Sending ──ok: commit watermark──► end of cycle
//!      │ error        │ error                            │
//!      └──────────────┴──────(abandon, no commit)───────►│
//!                                                        ▼
//!                                   Sleeping(BaseInterval) ──► CycleStart
//! ```
//!
//! `check_now_requested` is cleared at the end of every cycle, including an
//! abandoned one.

use std::time::Duration;

use serde::Serialize;

use crate::activities::{ActivityError, DelayMessageRequest, OutboundEmail, TrafficConditions};
use crate::config::MonitorConfig;
use crate::debouncer::{self, IdempotencyKey, NoticeIntent, PendingNotice};
use crate::error::CoreError;
use crate::evaluator::{self, Decision};
use crate::signals::{self, Signal};
use crate::state::MonitorState;
use crate::types::Minutes;

/// Wait between cycles when no signal intervenes.
pub const BASE_INTERVAL: Duration = Duration::from_secs(30 * 60);

// ---------------------------------------------------------------------------
// Public step / outcome types
// ---------------------------------------------------------------------------

/// Coarse state reported to status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Evaluating,
    Notifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepKind {
    Snooze,
    BaseInterval,
}

/// The effect the host must perform next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Suspend for `duration`, ending early if [`Monitor::wake_requested`]
    /// becomes true after a signal.
    Sleep { duration: Duration, kind: SleepKind },
    FetchTraffic { origin: String, destination: String },
    GenerateMessage(DelayMessageRequest),
    SendEmail(OutboundEmail),
}

/// Result of the effect requested by the last [`Step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Slept,
    Traffic(Result<TrafficConditions, ActivityError>),
    Message(Result<String, ActivityError>),
    Sent(Result<(), ActivityError>),
}

/// What a completed step amounted to, for logging and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// Moved to the next step within the same cycle.
    Advanced,
    /// A sleep finished and the next cycle is about to start.
    Woke,
    /// Cycle ended without a notification.
    Quiet { delay_minutes: Minutes },
    Escalated {
        delay_minutes: Minutes,
        key: IdempotencyKey,
    },
    Cleared {
        delay_minutes: Minutes,
        key: IdempotencyKey,
    },
    /// A collaborator failed; the cycle was dropped without touching the
    /// watermark.
    Abandoned {
        during: Phase,
        error: ActivityError,
    },
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Stage {
    CycleStart,
    Sleeping { duration: Duration, kind: SleepKind },
    Fetching,
    Writing { delay_minutes: Minutes },
    Sending {
        delay_minutes: Minutes,
        notice: PendingNotice,
        email: OutboundEmail,
    },
}

/// One delivery's monitoring state machine.
#[derive(Debug, Clone)]
pub struct Monitor {
    config: MonitorConfig,
    scope: String,
    state: MonitorState,
    stage: Stage,
    base_interval: Duration,
    last_delay_minutes: Option<Minutes>,
    notifications_sent: u64,
    cycles_completed: u64,
}

impl Monitor {
    /// Create a monitor with zeroed state. The first cycle starts without
    /// waiting.
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            scope: config.delivery_id.clone(),
            config,
            state: MonitorState::new(),
            stage: Stage::CycleStart,
            base_interval: BASE_INTERVAL,
            last_delay_minutes: None,
            notifications_sent: 0,
            cycles_completed: 0,
        }
    }

    /// Override the wait between cycles.
    pub fn with_base_interval(mut self, base_interval: Duration) -> Self {
        self.base_interval = base_interval;
        self
    }

    /// Tag outgoing emails with the run they belong to. Defaults to the
    /// delivery id.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        match self.stage {
            Stage::CycleStart | Stage::Sleeping { .. } => Phase::Waiting,
            Stage::Fetching => Phase::Evaluating,
            Stage::Writing { .. } | Stage::Sending { .. } => Phase::Notifying,
        }
    }

    /// What the monitor is sleeping for, if it is sleeping.
    pub fn sleep_kind(&self) -> Option<SleepKind> {
        match self.stage {
            Stage::Sleeping { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn last_delay_minutes(&self) -> Option<Minutes> {
        self.last_delay_minutes
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Apply a control signal. Never suspends.
    pub fn apply_signal(&mut self, signal: Signal) {
        signals::apply(&mut self.state, signal);
    }

    /// Whether a sleep in progress should end now: a check-now is pending or
    /// a snooze was requested for the next cycle.
    pub fn wake_requested(&self) -> bool {
        self.state.check_now_requested || self.state.pending_snooze_ms.is_some()
    }

    /// Return the next effect to perform. Calling `poll` again before
    /// [`complete`](Self::complete) returns the same step.
    pub fn poll(&mut self) -> Step {
        if self.stage == Stage::CycleStart {
            self.stage = self.start_cycle();
        }

        match &self.stage {
            Stage::CycleStart => unreachable!("cycle start resolves before dispatch"),
            Stage::Sleeping { duration, kind } => Step::Sleep {
                duration: *duration,
                kind: *kind,
            },
            Stage::Fetching => Step::FetchTraffic {
                origin: self.config.origin.clone(),
                destination: self.config.destination.clone(),
            },
            Stage::Writing { delay_minutes } => Step::GenerateMessage(DelayMessageRequest {
                origin: self.config.origin.clone(),
                destination: self.config.destination.clone(),
                delay_minutes: *delay_minutes,
            }),
            Stage::Sending { email, .. } => Step::SendEmail(email.clone()),
        }
    }

    /// Feed back the result of the step returned by [`poll`](Self::poll).
    ///
    /// Returns [`CoreError::Internal`] if the outcome does not match the
    /// pending step; the state is left unchanged in that case.
    pub fn complete(&mut self, outcome: Outcome) -> Result<CycleEvent, CoreError> {
        let stage = std::mem::replace(&mut self.stage, Stage::CycleStart);

        match (stage, outcome) {
            (Stage::Sleeping { .. }, Outcome::Slept) => {
                self.stage = Stage::CycleStart;
                Ok(CycleEvent::Woke)
            }

            (Stage::Fetching, Outcome::Traffic(Ok(conditions))) => {
                Ok(self.on_traffic(conditions.delay_minutes))
            }
            (Stage::Fetching, Outcome::Traffic(Err(error))) => {
                Ok(self.abandon(Phase::Evaluating, error))
            }

            (Stage::Writing { delay_minutes }, Outcome::Message(Ok(text))) => {
                let notice =
                    debouncer::on_escalate(&mut self.state, &self.config.delivery_id, delay_minutes);
                let email = self.escalation_email(delay_minutes, text, &notice.key);
                self.stage = Stage::Sending {
                    delay_minutes,
                    notice,
                    email,
                };
                Ok(CycleEvent::Advanced)
            }
            (Stage::Writing { .. }, Outcome::Message(Err(error))) => {
                Ok(self.abandon(Phase::Notifying, error))
            }

            (
                Stage::Sending {
                    delay_minutes,
                    notice,
                    ..
                },
                Outcome::Sent(Ok(())),
            ) => {
                notice.commit(&mut self.state);
                self.notifications_sent += 1;
                self.finish_cycle();
                let key = notice.key;
                Ok(match notice.intent {
                    NoticeIntent::Escalation { .. } => CycleEvent::Escalated { delay_minutes, key },
                    NoticeIntent::AllClear => CycleEvent::Cleared { delay_minutes, key },
                })
            }
            (Stage::Sending { .. }, Outcome::Sent(Err(error))) => {
                Ok(self.abandon(Phase::Notifying, error))
            }

            (stage, outcome) => {
                let message = format!("outcome {outcome:?} does not match stage {stage:?}");
                self.stage = stage;
                Err(CoreError::Internal(message))
            }
        }
    }

    // ---- private helpers ----

    /// Resolve the start of a cycle into either a snooze sleep or a fetch.
    fn start_cycle(&mut self) -> Stage {
        let snooze = self.state.pending_snooze_ms.take();
        match snooze {
            Some(ms) if !self.state.check_now_requested => Stage::Sleeping {
                duration: Duration::from_millis(ms),
                kind: SleepKind::Snooze,
            },
            // A check-now skips and discards any pending snooze.
            _ => Stage::Fetching,
        }
    }

    fn on_traffic(&mut self, delay_minutes: Minutes) -> CycleEvent {
        let delay_minutes = delay_minutes.max(0);
        self.last_delay_minutes = Some(delay_minutes);

        match evaluator::evaluate(delay_minutes, &self.config, &self.state) {
            Decision::Escalate => {
                self.stage = Stage::Writing { delay_minutes };
                CycleEvent::Advanced
            }
            Decision::Clear => {
                let notice = debouncer::on_clear(&mut self.state, &self.config.delivery_id);
                let email = self.all_clear_email(delay_minutes, &notice.key);
                self.stage = Stage::Sending {
                    delay_minutes,
                    notice,
                    email,
                };
                CycleEvent::Advanced
            }
            Decision::NoChange => {
                self.finish_cycle();
                CycleEvent::Quiet { delay_minutes }
            }
        }
    }

    fn abandon(&mut self, during: Phase, error: ActivityError) -> CycleEvent {
        self.finish_cycle();
        CycleEvent::Abandoned { during, error }
    }

    fn finish_cycle(&mut self) {
        self.state.check_now_requested = false;
        self.cycles_completed += 1;
        self.stage = Stage::Sleeping {
            duration: self.base_interval,
            kind: SleepKind::BaseInterval,
        };
    }

    fn escalation_email(
        &self,
        delay_minutes: Minutes,
        body: String,
        key: &IdempotencyKey,
    ) -> OutboundEmail {
        OutboundEmail {
            to: self.config.recipient_email.clone(),
            subject: format!(
                "Delivery {} delayed by {delay_minutes} minutes",
                self.config.delivery_id
            ),
            body,
            idempotency_key: key.to_string(),
            scope: self.scope.clone(),
        }
    }

    fn all_clear_email(&self, delay_minutes: Minutes, key: &IdempotencyKey) -> OutboundEmail {
        let c = &self.config;
        OutboundEmail {
            to: c.recipient_email.clone(),
            subject: format!("Delivery {} is back on track", c.delivery_id),
            body: format!(
                "Good news: delivery {} from {} to {} is back on track. \
                 The current delay is {delay_minutes} minutes, under your {}-minute threshold.",
                c.delivery_id, c.origin, c.destination, c.threshold_minutes
            ),
            idempotency_key: key.to_string(),
            scope: self.scope.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
