//! In-memory collaborators with scripted behaviour.
//!
//! Used by this crate's tests and by the API crate's integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use delaywatch_core::activities::{
    ActivityError, DelayMessageRequest, MessageWriter, Notifier, OutboundEmail, TrafficConditions,
    TrafficSource,
};
use delaywatch_core::types::Minutes;

use crate::collaborators::Collaborators;

/// Holds collaborator calls in flight until the test releases them.
pub struct Gate {
    permits: tokio::sync::Semaphore,
    arrived: AtomicU32,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            permits: tokio::sync::Semaphore::new(0),
            arrived: AtomicU32::new(0),
        })
    }

    /// Let `n` waiting (or future) calls through.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    /// Calls that have reached the gate so far.
    pub fn arrived(&self) -> u32 {
        self.arrived.load(Ordering::SeqCst)
    }

    async fn pass(&self) -> Result<(), ActivityError> {
        self.arrived.fetch_add(1, Ordering::SeqCst);
        self.permits
            .acquire()
            .await
            .map(|permit| permit.forget())
            .map_err(|_| ActivityError::Permanent("gate closed".into()))
    }
}

/// Replays a fixed sequence of readings. The last entry repeats forever.
pub struct ScriptedTraffic {
    script: Mutex<VecDeque<Result<Minutes, ActivityError>>>,
    last: Mutex<Result<Minutes, ActivityError>>,
    calls: Mutex<u32>,
    gate: Option<Arc<Gate>>,
}

impl ScriptedTraffic {
    pub fn new(script: impl IntoIterator<Item = Result<Minutes, ActivityError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Ok(0)),
            calls: Mutex::new(0),
            gate: None,
        }
    }

    /// Make every call wait at `gate` before answering.
    pub fn behind(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Convenience for a script of successful delays.
    pub fn delays(delays: impl IntoIterator<Item = Minutes>) -> Self {
        Self::new(delays.into_iter().map(Ok))
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TrafficSource for ScriptedTraffic {
    async fn fetch_traffic_conditions(
        &self,
        _origin: &str,
        _destination: &str,
    ) -> Result<TrafficConditions, ActivityError> {
        *self.calls.lock().unwrap() += 1;
        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(item) = script.pop_front() {
                *last = item.clone();
            }
            last.clone()
        };
        if let Some(gate) = &self.gate {
            gate.pass().await?;
        }
        next.map(|delay| {
            let planned = 30 * 60;
            TrafficConditions::from_seconds(planned, planned + delay * 60)
        })
    }
}

/// Writes a deterministic message, or fails when told to.
#[derive(Default)]
pub struct EchoMessageWriter {
    failures: Mutex<VecDeque<ActivityError>>,
}

impl EchoMessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls with the given errors, in order.
    pub fn failing_with(errors: impl IntoIterator<Item = ActivityError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
        }
    }
}

#[async_trait]
impl MessageWriter for EchoMessageWriter {
    async fn generate_delay_message(
        &self,
        request: &DelayMessageRequest,
    ) -> Result<String, ActivityError> {
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(format!(
            "Traffic from {} to {} is running {} minutes late.",
            request.origin, request.destination, request.delay_minutes
        ))
    }
}

/// Records every email it is asked to send. A repeated scope and key pair is
/// recorded once.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OutboundEmail>>,
    failures: Mutex<VecDeque<ActivityError>>,
    gate: Option<Arc<Gate>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls with the given errors, in order.
    pub fn failing_with(errors: impl IntoIterator<Item = ActivityError>) -> Self {
        Self {
            failures: Mutex::new(errors.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Make every send wait at `gate` before it is recorded.
    pub fn behind(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|e| e.subject).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification_email(&self, email: &OutboundEmail) -> Result<(), ActivityError> {
        if let Some(gate) = &self.gate {
            gate.pass().await?;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        if !sent
            .iter()
            .any(|e| e.scope == email.scope && e.idempotency_key == email.idempotency_key)
        {
            sent.push(email.clone());
        }
        Ok(())
    }
}

/// Handles to the fakes behind a [`Collaborators`] bundle.
pub struct FakeCollaborators {
    pub traffic: Arc<ScriptedTraffic>,
    pub messages: Arc<EchoMessageWriter>,
    pub notifier: Arc<RecordingNotifier>,
}

impl FakeCollaborators {
    pub fn new(traffic: ScriptedTraffic) -> Self {
        Self {
            traffic: Arc::new(traffic),
            messages: Arc::new(EchoMessageWriter::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    pub fn with_notifier(mut self, notifier: RecordingNotifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn with_messages(mut self, messages: EchoMessageWriter) -> Self {
        self.messages = Arc::new(messages);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.traffic.clone(),
            self.messages.clone(),
            self.notifier.clone(),
        )
    }
}
