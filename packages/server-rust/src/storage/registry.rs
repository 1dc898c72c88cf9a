use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use super::datastore::{DataStore, DataStoreConfig, StoreError};

// ---------------------------------------------------------------------------
// ManagedStore trait
// ---------------------------------------------------------------------------

/// Type-erased view of a [`DataStore`] used for maintenance.
///
/// The `Any` bound lets the registry hand back the concrete store through
/// [`DataStoreRegistry::get`].
pub trait ManagedStore: Send + Sync + Any {
    fn id(&self) -> Uuid;

    fn len(&self) -> usize;

    fn size(&self) -> u64;

    /// Evicts entries due for turnover; returns how many left the store.
    fn popitems_expired(&self) -> usize;

    /// Restarts the store clock.
    fn reset_init(&self);
}

impl<V: Clone + Send + Sync + 'static> ManagedStore for DataStore<V> {
    fn id(&self) -> Uuid {
        DataStore::id(self)
    }

    fn len(&self) -> usize {
        DataStore::len(self)
    }

    fn size(&self) -> u64 {
        DataStore::size(self)
    }

    fn popitems_expired(&self) -> usize {
        DataStore::popitems_expired(self)
    }

    fn reset_init(&self) {
        DataStore::reset_init(self);
    }
}

// ---------------------------------------------------------------------------
// DataStoreRegistry
// ---------------------------------------------------------------------------

/// Store-of-stores keyed by each store's own id.
///
/// Provides two lookup mechanisms:
/// - **Typed** (`get::<V>`): downcasts to `Arc<DataStore<V>>`
/// - **Untyped** (`get_datastore`): the maintenance view, failing on unknown ids
///
/// Sweeps visit stores in registration order.
pub struct DataStoreRegistry {
    managed: DashMap<Uuid, Arc<dyn ManagedStore>>,
    typed: DashMap<Uuid, Arc<dyn Any + Send + Sync>>,
    order: RwLock<Vec<Uuid>>,
}

impl DataStoreRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            managed: DashMap::new(),
            typed: DashMap::new(),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Builds a store and registers it in one step.
    pub fn create<V: Clone + Send + Sync + 'static>(
        &self,
        config: DataStoreConfig,
    ) -> Arc<DataStore<V>> {
        self.register(DataStore::new(config))
    }

    /// Registers an already configured store.
    pub fn register<V: Clone + Send + Sync + 'static>(
        &self,
        store: DataStore<V>,
    ) -> Arc<DataStore<V>> {
        let store = Arc::new(store);
        let id = store.id();
        self.managed.insert(id, store.clone());
        self.typed.insert(id, store.clone());
        self.order.write().push(id);
        tracing::debug!(store = %id, "data store registered");
        store
    }

    /// Retrieve a store with its value type.
    ///
    /// `None` when the id is unknown or holds another value type.
    #[must_use]
    pub fn get<V: Clone + Send + Sync + 'static>(&self, id: &Uuid) -> Option<Arc<DataStore<V>>> {
        self.typed
            .get(id)
            .and_then(|entry| entry.value().clone().downcast::<DataStore<V>>().ok())
    }

    /// Retrieve a store for maintenance.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownStore`] when no store has that id.
    pub fn get_datastore(&self, id: &Uuid) -> Result<Arc<dyn ManagedStore>, StoreError> {
        self.managed
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::UnknownStore { id: *id })
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.managed.contains_key(id)
    }

    /// Store ids in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.order.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.managed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managed.is_empty()
    }

    /// Runs the expiry eviction on every registered store.
    /// Returns the total number of evicted entries.
    pub fn sweep(&self) -> usize {
        let order = self.order.read().clone();
        let mut evicted = 0;
        for id in &order {
            if let Ok(store) = self.get_datastore(id) {
                evicted += store.popitems_expired();
            }
        }
        if evicted > 0 {
            tracing::info!(stores = order.len(), evicted, "data store sweep finished");
        }
        evicted
    }

    /// Removes every store. Handles already given out stay usable.
    pub fn clear(&self) {
        self.managed.clear();
        self.typed.clear();
        self.order.write().clear();
    }
}

impl Default for DataStoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;

    fn config(max_length: usize) -> DataStoreConfig {
        DataStoreConfig {
            max_length,
            max_size: 10,
            max_duration: Duration::from_millis(1),
        }
    }

    #[test]
    fn create_registers_and_get_by_type() {
        let registry = DataStoreRegistry::new();
        let store = registry.create::<Value>(config(2));
        store.append(json!(1), false).unwrap();

        let found = registry.get::<Value>(&store.id()).unwrap();
        assert!(Arc::ptr_eq(&found, &store));
        assert_eq!(found.len(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&store.id()));
    }

    #[test]
    fn get_with_wrong_type_returns_none() {
        let registry = DataStoreRegistry::new();
        let store = registry.create::<Value>(config(2));
        assert!(registry.get::<String>(&store.id()).is_none());
        assert!(registry.get::<Value>(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn get_datastore_unknown_id_fails() {
        let registry = DataStoreRegistry::new();
        let id = Uuid::new_v4();
        let err = registry.get_datastore(&id).err().unwrap();
        assert_eq!(err, StoreError::UnknownStore { id });
        assert_eq!(err.to_string(), format!("no data store found with id '{id}'"));
    }

    #[test]
    fn get_datastore_exposes_maintenance_view() {
        let registry = DataStoreRegistry::new();
        let store = registry.register(DataStore::with_calc_size(config(3), |_: &u32| 2));
        store.extend([1, 2]).unwrap();

        let managed = registry.get_datastore(&store.id()).unwrap();
        assert_eq!(managed.id(), store.id());
        assert_eq!(managed.len(), 2);
        assert_eq!(managed.size(), 4);
    }

    #[test]
    fn sweep_evicts_expired_entries_everywhere() {
        let registry = DataStoreRegistry::new();
        let values = registry.create::<Value>(config(2));
        let names = registry.create::<String>(config(2));
        values.append(json!("a"), false).unwrap();
        let pinned = names.append("kept".to_string(), false).unwrap();
        names.pin(pinned);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.sweep(), 1);
        assert!(values.is_empty());
        assert!(names.contains(&pinned));
        assert_eq!(registry.ids(), vec![values.id(), names.id()]);
    }

    #[test]
    fn clear_is_explicit_teardown() {
        let registry = DataStoreRegistry::new();
        let store = registry.create::<Value>(config(1));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get::<Value>(&store.id()).is_none());
        assert!(registry.ids().is_empty());
        store.append(json!(1), false).unwrap();
    }
}
