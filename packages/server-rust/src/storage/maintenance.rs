//! Background maintenance for data stores.
//!
//! A [`MaintenanceWorker`] owns one [`Maintenance`] job on a spawned tokio
//! task. The job sees three events: an explicit request sent through the
//! worker handle, a periodic tick, and shutdown. Stopping the worker hands the
//! job back so callers can read whatever it accumulated.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

/// A maintenance job driven by [`MaintenanceWorker`].
#[async_trait]
pub trait Maintenance: Send + 'static {
    /// On-demand work items.
    type Request: Send + 'static;

    async fn handle(&mut self, request: Self::Request);

    /// Periodic pass. Default is a no-op.
    async fn tick(&mut self) {}

    /// Runs once after the last request or tick.
    async fn finish(&mut self) {}
}

/// Errors returned to callers of [`MaintenanceWorker::request`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("maintenance worker is stopped")]
    Stopped,
    #[error("maintenance queue is full ({capacity} pending requests)")]
    QueueFull { capacity: usize },
}

/// Tick period and request queue depth of a [`MaintenanceWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub interval: Duration,
    pub queue_capacity: usize,
}

impl WorkerConfig {
    #[must_use]
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            queue_capacity: 64,
        }
    }
}

/// Handle to a spawned maintenance job.
pub struct MaintenanceWorker<M: Maintenance> {
    requests: Option<mpsc::Sender<M::Request>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<M>>,
    capacity: usize,
}

impl<M: Maintenance> MaintenanceWorker<M> {
    /// Spawns `job` on the current runtime.
    ///
    /// The first tick fires one full interval after spawning. Ticks that
    /// fall behind are delayed rather than bunched.
    pub fn spawn(mut job: M, config: WorkerConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let interval = config.interval.max(Duration::from_millis(1));
        let (requests, mut rx) = mpsc::channel::<M::Request>(capacity);
        let (shutdown, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    request = rx.recv() => match request {
                        Some(request) => job.handle(request).await,
                        None => break,
                    },
                    _ = ticker.tick() => job.tick().await,
                    _ = &mut shutdown_rx => break,
                }
            }

            job.finish().await;
            job
        });

        Self {
            requests: Some(requests),
            shutdown: Some(shutdown),
            handle: Some(handle),
            capacity,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Queues `request` without waiting for room.
    ///
    /// # Errors
    ///
    /// [`WorkerError::QueueFull`] when the queue is at capacity,
    /// [`WorkerError::Stopped`] once the worker is gone.
    pub fn request(&self, request: M::Request) -> Result<(), WorkerError> {
        let Some(tx) = &self.requests else {
            return Err(WorkerError::Stopped);
        };
        tx.try_send(request).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => WorkerError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => WorkerError::Stopped,
        })
    }

    /// Stops the job and returns it once [`Maintenance::finish`] ran.
    ///
    /// `None` when the worker was already stopped or its task panicked.
    pub async fn stop(&mut self) -> Option<M> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.requests.take();
        let handle = self.handle.take()?;
        match handle.await {
            Ok(job) => Some(job),
            Err(err) => {
                tracing::error!(error = %err, "maintenance task ended abnormally");
                None
            }
        }
    }
}
