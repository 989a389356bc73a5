//! Async driver for a single monitor instance.
//!
//! [`MonitorTask`] owns one [`Monitor`] and performs the effects it asks
//! for. Signals arrive on an unbounded mailbox and are drained in order
//! before every step and while sleeping, so their effects are visible to
//! the very next cycle read. Cancellation is observed before each step and
//! during sleeps; a collaborator call that is already in flight runs to
//! completion so no email is ever half-dispatched.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use delaywatch_core::monitor::CycleEvent;
use delaywatch_core::{InstanceId, Monitor, Outcome, Signal, Step};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collaborators::Collaborators;
use crate::retry::{with_retry, RetryPolicy};
use crate::snapshot::MonitorSnapshot;

/// Why a monitor task stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    Cancelled,
    /// The state machine rejected an outcome. Indicates a host bug.
    Faulted(String),
}

/// How a sleep ended.
enum Wake {
    Elapsed,
    Signalled,
    Cancelled,
}

/// One running monitor instance.
pub struct MonitorTask {
    instance_id: InstanceId,
    monitor: Monitor,
    collaborators: Collaborators,
    retry: RetryPolicy,
    signals: mpsc::UnboundedReceiver<Signal>,
    signals_open: bool,
    snapshot: Arc<watch::Sender<MonitorSnapshot>>,
    cancel: CancellationToken,
}

impl MonitorTask {
    pub fn new(
        instance_id: InstanceId,
        monitor: Monitor,
        collaborators: Collaborators,
        retry: RetryPolicy,
        signals: mpsc::UnboundedReceiver<Signal>,
        snapshot: Arc<watch::Sender<MonitorSnapshot>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            instance_id,
            monitor,
            collaborators,
            retry,
            signals,
            signals_open: true,
            snapshot,
            cancel,
        }
    }

    /// Run cycles until cancelled. Returns the final state machine.
    pub async fn run(mut self) -> (Monitor, RunExit) {
        tracing::info!(
            instance_id = %self.instance_id,
            delivery_id = %self.monitor.config().delivery_id,
            "Monitor started",
        );

        let exit = loop {
            self.drain_signals();
            if self.cancel.is_cancelled() {
                break RunExit::Cancelled;
            }
            let step = self.monitor.poll();
            self.publish();

            let outcome = match step {
                Step::Sleep { duration, kind } => {
                    tracing::debug!(
                        instance_id = %self.instance_id,
                        ?kind,
                        sleep_secs = duration.as_secs(),
                        "Monitor sleeping",
                    );
                    match self.sleep(duration).await {
                        Wake::Cancelled => break RunExit::Cancelled,
                        Wake::Elapsed | Wake::Signalled => Outcome::Slept,
                    }
                }
                Step::FetchTraffic {
                    origin,
                    destination,
                } => {
                    let traffic = Arc::clone(&self.collaborators.traffic);
                    let result = with_retry(
                        &self.retry,
                        "fetch_traffic_conditions",
                        &self.cancel,
                        || traffic.fetch_traffic_conditions(&origin, &destination),
                    )
                    .await;
                    self.snapshot
                        .send_modify(|s| s.last_checked_at = Some(Utc::now()));
                    Outcome::Traffic(result)
                }
                Step::GenerateMessage(request) => {
                    let messages = Arc::clone(&self.collaborators.messages);
                    let result = with_retry(
                        &self.retry,
                        "generate_delay_message",
                        &self.cancel,
                        || messages.generate_delay_message(&request),
                    )
                    .await;
                    Outcome::Message(result)
                }
                Step::SendEmail(email) => {
                    let notifier = Arc::clone(&self.collaborators.notifier);
                    let result = with_retry(
                        &self.retry,
                        "send_notification_email",
                        &self.cancel,
                        || notifier.send_notification_email(&email),
                    )
                    .await;
                    Outcome::Sent(result)
                }
            };

            match self.monitor.complete(outcome) {
                Ok(event) => self.record(event),
                Err(e) => {
                    tracing::error!(
                        instance_id = %self.instance_id,
                        error = %e,
                        "Monitor state machine rejected outcome",
                    );
                    break RunExit::Faulted(e.to_string());
                }
            }
        };

        self.publish();
        tracing::info!(instance_id = %self.instance_id, ?exit, "Monitor stopped");
        (self.monitor, exit)
    }

    // ---- private helpers ----

    /// Apply every queued signal without waiting.
    fn drain_signals(&mut self) {
        while self.signals_open {
            match self.signals.try_recv() {
                Ok(signal) => self.apply(signal),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => self.signals_open = false,
            }
        }
    }

    fn apply(&mut self, signal: Signal) {
        tracing::info!(
            instance_id = %self.instance_id,
            signal = signal.name(),
            "Signal applied",
        );
        self.monitor.apply_signal(signal);
        self.publish();
    }

    /// Sleep for `duration`, applying signals as they arrive and ending early
    /// when the monitor asks to be woken.
    async fn sleep(&mut self, duration: Duration) -> Wake {
        if self.monitor.wake_requested() {
            return Wake::Signalled;
        }

        let cancel = self.cancel.clone();
        let timer = tokio::time::sleep_until(Instant::now() + duration);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Wake::Cancelled,
                received = self.signals.recv(), if self.signals_open => match received {
                    Some(signal) => {
                        self.apply(signal);
                        if self.monitor.wake_requested() {
                            return Wake::Signalled;
                        }
                    }
                    None => self.signals_open = false,
                },
                _ = &mut timer => return Wake::Elapsed,
            }
        }
    }

    fn record(&mut self, event: CycleEvent) {
        let id = &self.instance_id;
        match &event {
            CycleEvent::Advanced | CycleEvent::Woke => {}
            CycleEvent::Quiet { delay_minutes } => {
                tracing::debug!(instance_id = %id, delay_minutes, "Cycle finished, no notice");
            }
            CycleEvent::Escalated { delay_minutes, key } => {
                tracing::info!(
                    instance_id = %id,
                    delay_minutes,
                    idempotency_key = %key,
                    "Delay escalation sent",
                );
            }
            CycleEvent::Cleared { delay_minutes, key } => {
                tracing::info!(
                    instance_id = %id,
                    delay_minutes,
                    idempotency_key = %key,
                    "All-clear sent",
                );
            }
            CycleEvent::Abandoned { during, error } => {
                tracing::warn!(
                    instance_id = %id,
                    ?during,
                    error = %error,
                    "Cycle abandoned, will retry on next wake",
                );
            }
        }

        let last_error = match event {
            CycleEvent::Abandoned { error, .. } => Some(Some(error.to_string())),
            CycleEvent::Quiet { .. } | CycleEvent::Escalated { .. } | CycleEvent::Cleared { .. } => {
                Some(None)
            }
            CycleEvent::Advanced | CycleEvent::Woke => None,
        };
        if let Some(last_error) = last_error {
            self.snapshot.send_modify(|s| s.last_error = last_error);
        }
    }

    fn publish(&self) {
        let monitor = &self.monitor;
        self.snapshot.send_modify(|s| s.refresh(monitor));
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use delaywatch_core::{MonitorConfig, Phase};

    use super::*;
    use crate::fakes::{FakeCollaborators, Gate, RecordingNotifier, ScriptedTraffic};

    fn config() -> MonitorConfig {
        MonitorConfig {
            delivery_id: "d1".to_string(),
            origin: "A".to_string(),
            destination: "B".to_string(),
            recipient_email: "ops@example.com".to_string(),
            threshold_minutes: 30,
            notify_delta_minutes: 10,
        }
    }

    fn task(
        fakes: &FakeCollaborators,
        cancel: CancellationToken,
    ) -> (MonitorTask, mpsc::UnboundedSender<Signal>) {
        task_with(fakes.collaborators(), cancel)
    }

    fn task_with(
        collaborators: Collaborators,
        cancel: CancellationToken,
    ) -> (MonitorTask, mpsc::UnboundedSender<Signal>) {
        let id = InstanceId::from("delivery-d1-2026-10-19".to_string());
        let monitor = Monitor::new(config());
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot::starting(id.clone(), &monitor));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let task = MonitorTask::new(
            id,
            monitor,
            collaborators,
            RetryPolicy::default(),
            signal_rx,
            Arc::new(snapshot_tx),
            cancel,
        );
        (task, signal_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_step_runs_nothing() {
        let fakes = FakeCollaborators::new(ScriptedTraffic::delays([50]));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (task, _signals) = task(&fakes, cancel);

        let (monitor, exit) = task.run().await;

        assert_eq!(exit, RunExit::Cancelled);
        assert_eq!(monitor.cycles_completed(), 0);
        assert_eq!(fakes.traffic.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_stops_after_current_cycle() {
        let fakes = FakeCollaborators::new(ScriptedTraffic::delays([50]));
        let cancel = CancellationToken::new();
        let (task, _signals) = task(&fakes, cancel.clone());
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();
        let (monitor, exit) = handle.await.unwrap();

        assert_matches!(exit, RunExit::Cancelled);
        assert_eq!(monitor.cycles_completed(), 1);
        assert_eq!(monitor.phase(), Phase::Waiting);
        assert_eq!(monitor.state().highest_notified_delay_minutes(), 50);
        assert_eq!(fakes.notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signals_queued_before_start_apply_to_first_cycle() {
        let fakes = FakeCollaborators::new(ScriptedTraffic::delays([5]));
        let cancel = CancellationToken::new();
        let (task, signals) = task(&fakes, cancel.clone());
        signals.send(Signal::Snooze { minutes: 10.0 }).unwrap();
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(fakes.traffic.calls(), 0);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(fakes.traffic.calls(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    /// Advance the paused clock one second at a time until `cond` holds.
    async fn settle(max_secs: u64, cond: impl Fn() -> bool) {
        for _ in 0..max_secs {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        panic!("condition not met within {max_secs}s");
    }

    #[tokio::test(start_paused = true)]
    async fn check_now_during_fetch_skips_the_following_wait() {
        let gate = Gate::new();
        let fakes = FakeCollaborators::new(ScriptedTraffic::delays([5]).behind(gate.clone()));
        let cancel = CancellationToken::new();
        let (task, signals) = task(&fakes, cancel.clone());
        let handle = tokio::spawn(task.run());

        settle(5, || gate.arrived() == 1).await;
        signals.send(Signal::CheckNow).unwrap();
        gate.release(1);

        // The flag outlives the end of the in-flight cycle and the next
        // fetch starts well before the 30 minute base wait.
        settle(5, || gate.arrived() == 2).await;
        assert_eq!(fakes.traffic.calls(), 2);

        gate.release(1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let (monitor, exit) = handle.await.unwrap();
        assert_eq!(exit, RunExit::Cancelled);
        assert_eq!(monitor.cycles_completed(), 2);
        assert!(!monitor.state().check_now_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_during_send_sets_the_following_wait() {
        let gate = Gate::new();
        let fakes = FakeCollaborators::new(ScriptedTraffic::delays([35]))
            .with_notifier(RecordingNotifier::new().behind(gate.clone()));
        let cancel = CancellationToken::new();
        let (task, signals) = task(&fakes, cancel.clone());
        let handle = tokio::spawn(task.run());

        settle(5, || gate.arrived() == 1).await;
        signals.send(Signal::Snooze { minutes: 10.0 }).unwrap();
        gate.release(1);
        settle(5, || fakes.notifier.sent().len() == 1).await;
        let released_at = Instant::now();

        tokio::time::sleep_until(released_at + Duration::from_secs(590)).await;
        assert_eq!(fakes.traffic.calls(), 1);

        tokio::time::sleep_until(released_at + Duration::from_secs(610)).await;
        assert_eq!(fakes.traffic.calls(), 2);

        cancel.cancel();
        let (monitor, exit) = handle.await.unwrap();
        assert_eq!(exit, RunExit::Cancelled);
        assert_eq!(monitor.notifications_sent(), 1);
        assert_eq!(monitor.state().pending_snooze_ms(), None);
    }
}
