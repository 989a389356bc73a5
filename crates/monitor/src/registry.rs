//! Multi-instance monitor registry.
//!
//! [`MonitorRegistry`] starts one [`MonitorTask`] per delivery and routes
//! signals, status queries and cancellation to it by [`InstanceId`].
//! Terminated instances stay in the registry so their final status remains
//! queryable; starting the same identity again replaces them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use delaywatch_core::{CoreError, InstanceId, Monitor, MonitorConfig, Signal};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::collaborators::Collaborators;
use crate::runner::{MonitorTask, RunExit};
use crate::settings::MonitorSettings;
use crate::snapshot::{InstanceStatus, MonitorSnapshot};

/// How long `cancel` and `shutdown` wait for a task to stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns every monitor instance started by this process.
///
/// Wrap in an `Arc` and clone into request handlers.
pub struct MonitorRegistry {
    instances: RwLock<HashMap<InstanceId, ManagedMonitor>>,
    collaborators: Collaborators,
    settings: MonitorSettings,
    /// Source of run numbers. Seeded from the wall clock so runs started by
    /// a later process do not reuse them.
    runs: AtomicU64,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

/// Internal bookkeeping for a single monitor instance.
struct ManagedMonitor {
    signals: mpsc::UnboundedSender<Signal>,
    snapshot: Arc<watch::Sender<MonitorSnapshot>>,
    /// Per-instance cancellation token (child of the master token).
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ManagedMonitor {
    fn status(&self) -> InstanceStatus {
        self.snapshot.borrow().status
    }
}

impl MonitorRegistry {
    pub fn new(collaborators: Collaborators, settings: MonitorSettings) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            collaborators,
            settings,
            runs: AtomicU64::new(u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)),
            cancel: CancellationToken::new(),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Validate `config` and start monitoring under the identity derived from
    /// the delivery id and `creation_date`.
    pub async fn start(
        &self,
        config: MonitorConfig,
        creation_date: NaiveDate,
    ) -> Result<MonitorSnapshot, RegistryError> {
        config.validate_config()?;
        if self.cancel.is_cancelled() {
            return Err(RegistryError::ShuttingDown);
        }

        let instance_id = InstanceId::for_delivery(&config.delivery_id, creation_date);
        let mut instances = self.instances.write().await;
        if instances
            .get(&instance_id)
            .is_some_and(|m| m.status().is_running())
        {
            return Err(RegistryError::AlreadyRunning(instance_id));
        }

        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let monitor = Monitor::new(config)
            .with_base_interval(self.settings.poll_interval)
            .with_scope(format!("{instance_id}.{run}"));
        let snapshot = MonitorSnapshot::starting(instance_id.clone(), &monitor);
        let (snapshot_tx, _) = watch::channel(snapshot.clone());
        let snapshot_tx = Arc::new(snapshot_tx);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let instance_cancel = self.cancel.child_token();

        let task = MonitorTask::new(
            instance_id.clone(),
            monitor,
            self.collaborators.clone(),
            self.settings.retry.clone(),
            signal_rx,
            Arc::clone(&snapshot_tx),
            instance_cancel.clone(),
        );
        let task_handle = tokio::spawn(supervise(
            instance_id.clone(),
            task,
            Arc::clone(&snapshot_tx),
            self.cancel.clone(),
        ));

        tracing::info!(
            instance_id = %instance_id,
            delivery_id = %snapshot.config.delivery_id,
            threshold_minutes = snapshot.config.threshold_minutes,
            "Monitor instance registered",
        );

        instances.insert(
            instance_id,
            ManagedMonitor {
                signals: signal_tx,
                snapshot: snapshot_tx,
                cancel: instance_cancel,
                task_handle: Some(task_handle),
            },
        );
        Ok(snapshot)
    }

    /// Deliver a control signal to a running instance.
    pub async fn signal(&self, id: &InstanceId, signal: Signal) -> Result<(), RegistryError> {
        let instances = self.instances.read().await;
        let managed = instances
            .get(id)
            .filter(|m| m.status().is_running())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        managed
            .signals
            .send(signal)
            .map_err(|_| RegistryError::NotFound(id.clone()))?;

        tracing::debug!(instance_id = %id, signal = signal.name(), "Signal queued");
        Ok(())
    }

    /// Current snapshot of one instance.
    pub async fn status(&self, id: &InstanceId) -> Result<MonitorSnapshot, RegistryError> {
        self.instances
            .read()
            .await
            .get(id)
            .map(|m| m.snapshot.borrow().clone())
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Snapshots of every known instance, ordered by identity.
    pub async fn list(&self) -> Vec<MonitorSnapshot> {
        let mut snapshots: Vec<_> = self
            .instances
            .read()
            .await
            .values()
            .map(|m| m.snapshot.borrow().clone())
            .collect();
        snapshots.sort_by(|a, b| a.instance_id.as_str().cmp(b.instance_id.as_str()));
        snapshots
    }

    /// Request termination and wait (bounded) for the task to stop.
    ///
    /// Cancelling an instance that already stopped is a no-op.
    pub async fn cancel(&self, id: &InstanceId) -> Result<MonitorSnapshot, RegistryError> {
        let (handle, snapshot) = {
            let mut instances = self.instances.write().await;
            let managed = instances
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
            managed.cancel.cancel();
            (managed.task_handle.take(), Arc::clone(&managed.snapshot))
        };

        if let Some(handle) = handle {
            tracing::info!(instance_id = %id, "Cancelling monitor instance");
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                tracing::warn!(instance_id = %id, "Monitor task did not stop in time");
            }
        }

        let current = snapshot.borrow().clone();
        Ok(current)
    }

    /// Gracefully stop every instance.
    ///
    /// Cancels the master token, then waits up to 5 seconds for the tasks to
    /// exit together. The instance map is not locked while waiting, so status
    /// queries keep answering. Instances stopped this way report `completed`.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down monitor registry");
        self.cancel.cancel();

        let handles: Vec<_> = {
            let mut instances = self.instances.write().await;
            instances
                .iter_mut()
                .filter_map(|(id, managed)| {
                    managed.task_handle.take().map(|handle| (id.clone(), handle))
                })
                .collect()
        };

        let mut tasks = JoinSet::new();
        for (id, handle) in handles {
            tracing::info!(instance_id = %id, "Stopping monitor task");
            tasks.spawn(async move {
                if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                    tracing::warn!(instance_id = %id, "Monitor task did not stop in time");
                }
            });
        }
        while tasks.join_next().await.is_some() {}

        tracing::info!("Monitor registry shut down complete");
    }
}

/// Run the monitor task in its own tokio task and record how it ended.
///
/// A panic inside the runner surfaces here as a `JoinError`.
async fn supervise(
    instance_id: InstanceId,
    task: MonitorTask,
    snapshot: Arc<watch::Sender<MonitorSnapshot>>,
    master: CancellationToken,
) {
    let status = match tokio::spawn(task.run()).await {
        Ok((_, RunExit::Cancelled)) if master.is_cancelled() => InstanceStatus::Completed,
        Ok((_, RunExit::Cancelled)) => InstanceStatus::Cancelled,
        Ok((_, RunExit::Faulted(error))) => {
            snapshot.send_modify(|s| s.last_error = Some(error));
            InstanceStatus::Failed
        }
        Err(e) => {
            tracing::error!(instance_id = %instance_id, error = %e, "Monitor task panicked");
            snapshot.send_modify(|s| s.last_error = Some(e.to_string()));
            InstanceStatus::Failed
        }
    };

    snapshot.send_modify(|s| s.status = status);
    tracing::info!(instance_id = %instance_id, ?status, "Monitor instance terminated");
}

/// Errors returned by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The monitor configuration was rejected.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// No running instance has this identity.
    #[error("Monitor instance {0} not found")]
    NotFound(InstanceId),

    /// An instance with this identity is still running.
    #[error("Monitor instance {0} is already running")]
    AlreadyRunning(InstanceId),

    /// The registry no longer accepts new instances.
    #[error("Monitor registry is shutting down")]
    ShuttingDown,
}
