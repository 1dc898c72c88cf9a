//! Bounded artifact storage.
//!
//! - [`DataStore`]: insertion-ordered cache with count, size and time budgets
//! - [`DataStoreRegistry`]: explicit store-of-stores keyed by store id
//! - [`MaintenanceWorker`]: spawned job with a request queue and a periodic tick
//! - [`StoreSweeper`]: the maintenance job that applies time-based expiry

pub mod datastore;
pub mod maintenance;
pub mod registry;
pub mod sweeper;

pub use datastore::{CalcSizeFn, DataStore, DataStoreConfig, StoreError};
pub use maintenance::{Maintenance, MaintenanceWorker, WorkerConfig, WorkerError};
pub use registry::{DataStoreRegistry, ManagedStore};
pub use sweeper::{StoreSweeper, SweepTask};
