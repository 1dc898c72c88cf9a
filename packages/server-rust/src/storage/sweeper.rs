//! Periodic expiry sweep over a [`DataStoreRegistry`].

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::registry::DataStoreRegistry;
use super::maintenance::Maintenance;

/// On-demand requests for the sweeper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepTask {
    /// Sweep every registered store.
    RunFull,
    /// Sweep a single store.
    RunStore { id: Uuid },
    /// Restart one store's expiry clock.
    ResetClock { id: Uuid },
}

/// Runs [`DataStoreRegistry::sweep`] on each tick and on demand.
pub struct StoreSweeper {
    registry: Arc<DataStoreRegistry>,
    total_evicted: usize,
}

impl StoreSweeper {
    #[must_use]
    pub fn new(registry: Arc<DataStoreRegistry>) -> Self {
        Self {
            registry,
            total_evicted: 0,
        }
    }

    /// Entries evicted since the sweeper started.
    #[must_use]
    pub fn total_evicted(&self) -> usize {
        self.total_evicted
    }
}

#[async_trait]
impl Maintenance for StoreSweeper {
    type Request = SweepTask;

    async fn handle(&mut self, request: SweepTask) {
        match request {
            SweepTask::RunFull => {
                self.total_evicted += self.registry.sweep();
            }
            SweepTask::RunStore { id } => match self.registry.get_datastore(&id) {
                Ok(store) => self.total_evicted += store.popitems_expired(),
                Err(err) => tracing::warn!(error = %err, "sweep requested for unknown store"),
            },
            SweepTask::ResetClock { id } => match self.registry.get_datastore(&id) {
                Ok(store) => store.reset_init(),
                Err(err) => tracing::warn!(error = %err, "clock reset requested for unknown store"),
            },
        }
    }

    async fn tick(&mut self) {
        let evicted = self.registry.sweep();
        self.total_evicted += evicted;
        tracing::debug!(
            stores = self.registry.len(),
            evicted,
            total_evicted = self.total_evicted,
            "store sweep tick"
        );
    }

    async fn finish(&mut self) {
        tracing::info!(total_evicted = self.total_evicted, "store sweeper stopped");
    }
}
