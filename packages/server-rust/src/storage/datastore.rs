//! Bounded, time-expiring artifact cache.
//!
//! A [`DataStore`] holds values under random [`Uuid`] keys in insertion
//! order, within three budgets: a slot count (`max_length`), a per-slot
//! weight (`max_size`, so the total budget is `max_size * max_length`) and a
//! turnover period (`max_duration`). Entries marked persistent are exempt
//! from forced and time-based eviction.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use uuid::Uuid;

/// Weight function applied to every stored value.
pub type CalcSizeFn<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors raised by [`DataStore`] and
/// [`DataStoreRegistry`](super::DataStoreRegistry).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("exceeded the maximum number of entries: {max_length}")]
    CountCapacity { max_length: usize },
    #[error("exceeded the maximum total size: {budget}")]
    SizeCapacity { budget: u64 },
    #[error("no entry found with id '{id}'")]
    NotFound { id: Uuid },
    #[error("no data store found with id '{id}'")]
    UnknownStore { id: Uuid },
}

impl StoreError {
    /// True for the two budget violations.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CountCapacity { .. } | Self::SizeCapacity { .. })
    }
}

// ---------------------------------------------------------------------------
// DataStoreConfig
// ---------------------------------------------------------------------------

/// Budgets of a [`DataStore`]. Zero values are raised to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataStoreConfig {
    /// Maximum number of entries.
    pub max_length: usize,
    /// Weight allowed per slot.
    pub max_size: u64,
    /// Period over which a full store is expected to turn over.
    pub max_duration: Duration,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            max_length: 1,
            max_size: 1,
            max_duration: Duration::from_secs(3600),
        }
    }
}

impl DataStoreConfig {
    fn normalized(self) -> Self {
        Self {
            max_length: self.max_length.max(1),
            max_size: self.max_size.max(1),
            max_duration: if self.max_duration.is_zero() {
                Duration::from_secs(3600)
            } else {
                self.max_duration
            },
        }
    }

    /// Total weight budget: `max_size * max_length`.
    #[must_use]
    pub fn total_budget(&self) -> u64 {
        self.max_size.saturating_mul(self.max_length as u64)
    }
}

// ---------------------------------------------------------------------------
// DataStore
// ---------------------------------------------------------------------------

struct Inner<V> {
    entries: IndexMap<Uuid, V>,
    persistent: IndexSet<Uuid>,
    init_at: Instant,
}

/// Insertion-ordered cache with count, size and time budgets.
///
/// All state sits behind one mutex: every check-then-write and every
/// eviction sequence runs under a single lock acquisition.
pub struct DataStore<V> {
    id: Uuid,
    created_at: SystemTime,
    config: DataStoreConfig,
    calc_size: CalcSizeFn<V>,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone + Send + Sync + 'static> DataStore<V> {
    /// Empty store; every value weighs `max_size`.
    #[must_use]
    pub fn new(config: DataStoreConfig) -> Self {
        let per_slot = config.normalized().max_size;
        Self::with_calc_size(config, move |_: &V| per_slot)
    }

    /// Empty store weighing values with `calc_size`.
    ///
    /// The weight function is fixed at construction so that every stored
    /// entry was admitted under it.
    #[must_use]
    pub fn with_calc_size<F>(config: DataStoreConfig, calc_size: F) -> Self
    where
        F: Fn(&V) -> u64 + Send + Sync + 'static,
    {
        Self {
            id: Uuid::new_v4(),
            created_at: SystemTime::now(),
            config: config.normalized(),
            calc_size: Arc::new(calc_size),
            inner: Mutex::new(Inner {
                entries: IndexMap::new(),
                persistent: IndexSet::new(),
                init_at: Instant::now(),
            }),
        }
    }

    /// Store pre-filled with `items`; `max_length` becomes the item count.
    ///
    /// # Errors
    ///
    /// The capacity error of the first item that does not fit.
    pub fn with_items(items: Vec<V>, config: DataStoreConfig) -> Result<Self, StoreError> {
        let config = DataStoreConfig {
            max_length: if items.is_empty() {
                config.max_length
            } else {
                items.len()
            },
            ..config
        };
        let store = Self::new(config);
        {
            let mut inner = store.inner.lock();
            for item in items {
                store.try_insert(&mut inner, Uuid::new_v4(), item)?;
            }
        }
        Ok(store)
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    #[must_use]
    pub fn init_at(&self) -> Instant {
        self.inner.lock().init_at
    }

    #[must_use]
    pub fn config(&self) -> &DataStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn total_budget(&self) -> u64 {
        self.config.total_budget()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Current total weight.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.weigh(&self.inner.lock()).unwrap_or(u64::MAX)
    }

    /// Entry ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.lock().entries.keys().copied().collect()
    }

    /// Entries in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<(Uuid, V)> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(id, v)| (*id, v.clone()))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner.lock().entries.contains_key(id)
    }

    // --- Entry access ---

    /// Stores `value` under `id`.
    ///
    /// # Errors
    ///
    /// [`StoreError::CountCapacity`] when `id` is new and the store is full,
    /// [`StoreError::SizeCapacity`] when the weight budget would be exceeded.
    pub fn set(&self, id: Uuid, value: V) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        self.try_insert(&mut inner, id, value)
    }

    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no entry has that id.
    pub fn get(&self, id: &Uuid) -> Result<V, StoreError> {
        self.inner
            .lock()
            .entries
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound { id: *id })
    }

    /// [`get`](Self::get) with the failure replaced by `fallback`.
    pub fn get_or(&self, id: &Uuid, fallback: V) -> V {
        self.get(id).unwrap_or(fallback)
    }

    /// Removes an entry and its persistent mark.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no entry has that id.
    pub fn remove(&self, id: &Uuid) -> Result<V, StoreError> {
        let mut inner = self.inner.lock();
        inner.persistent.shift_remove(id);
        inner
            .entries
            .shift_remove(id)
            .ok_or(StoreError::NotFound { id: *id })
    }

    /// Stores `value` under a fresh id.
    ///
    /// With `force`, the oldest non-persistent entries are evicted to make
    /// room; an item that could not fit even then fails with the original
    /// capacity error.
    ///
    /// # Errors
    ///
    /// The capacity error from [`set`](Self::set).
    pub fn append(&self, value: V, force: bool) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock();

        let err = match self.try_insert(&mut inner, id, value.clone()) {
            Ok(()) => return Ok(id),
            Err(err) if !force => return Err(err),
            Err(err) => err,
        };

        let size_of_item = (self.calc_size)(&value);
        let size_of_persistent = inner
            .entries
            .iter()
            .filter(|(k, _)| inner.persistent.contains(*k))
            .fold(0u64, |acc, (_, v)| acc.saturating_add((self.calc_size)(v)));

        if size_of_item > self.total_budget().saturating_sub(size_of_persistent) {
            return Err(err);
        }

        let dump_size = self
            .weigh(&inner)
            .unwrap_or(u64::MAX)
            .saturating_sub(size_of_persistent)
            .saturating_sub(size_of_item);

        let mut evicted = 0usize;
        for _ in 0..inner.entries.len() {
            let Some((key, entry)) = inner.entries.shift_remove_index(0) else {
                break;
            };
            if inner.persistent.contains(&key) {
                inner.entries.insert(key, entry);
                continue;
            }
            evicted += 1;
            if self.weigh(&inner).is_some_and(|size| size <= dump_size) {
                break;
            }
        }

        tracing::debug!(
            store = %self.id,
            evicted,
            dump_size,
            "forced append evicted entries"
        );

        self.try_insert(&mut inner, id, value)?;
        Ok(id)
    }

    /// Appends each value without forcing; stops at the first failure.
    ///
    /// # Errors
    ///
    /// The first capacity error; values before it stay stored.
    pub fn extend(&self, values: impl IntoIterator<Item = V>) -> Result<Vec<Uuid>, StoreError> {
        values
            .into_iter()
            .map(|value| self.append(value, false))
            .collect()
    }

    // --- Persistence marks ---

    /// Exempts `id` from eviction. Returns false when already pinned.
    pub fn pin(&self, id: Uuid) -> bool {
        self.inner.lock().persistent.insert(id)
    }

    /// Returns false when `id` was not pinned.
    pub fn unpin(&self, id: &Uuid) -> bool {
        self.inner.lock().persistent.shift_remove(id)
    }

    /// Flips the mark and returns the new state.
    pub fn toggle_persistent(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        if inner.persistent.shift_remove(&id) {
            false
        } else {
            inner.persistent.insert(id);
            true
        }
    }

    #[must_use]
    pub fn is_persistent(&self, id: &Uuid) -> bool {
        self.inner.lock().persistent.contains(id)
    }

    /// Pinned ids in pin order.
    #[must_use]
    pub fn persistent(&self) -> Vec<Uuid> {
        self.inner.lock().persistent.iter().copied().collect()
    }

    // --- Time-based expiry ---

    /// Time since the store clock was (re)started.
    #[must_use]
    pub fn time_elapsed(&self) -> Duration {
        self.init_at().elapsed()
    }

    /// True once a full turnover period has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.init_at() + self.config.max_duration
    }

    /// Restarts the store clock.
    pub fn reset_init(&self) {
        self.inner.lock().init_at = Instant::now();
    }

    /// Slots due for turnover at `now`, capped at `max_length`.
    #[must_use]
    pub fn count_items_expired(&self, now: Instant) -> usize {
        let init_at = self.init_at();
        self.due_at(init_at, now)
    }

    fn due_at(&self, init_at: Instant, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(init_at).as_nanos();
        let period = self.config.max_duration.as_nanos().max(1);
        let due = elapsed * self.config.max_length as u128 / period;
        usize::try_from(due)
            .unwrap_or(usize::MAX)
            .min(self.config.max_length)
    }

    /// Evicts entries due for turnover now. Returns how many left the store.
    pub fn popitems_expired(&self) -> usize {
        self.popitems_expired_at(Instant::now())
    }

    /// Evicts the oldest entries so that at most `max_length - due` remain,
    /// skipping persistent ones.
    pub fn popitems_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let due = self.due_at(inner.init_at, now);
        let keep = self.config.max_length - due;
        let over = inner.entries.len().saturating_sub(keep);

        let mut evicted = 0usize;
        for _ in 0..over {
            let Some((key, entry)) = inner.entries.shift_remove_index(0) else {
                break;
            };
            if inner.persistent.contains(&key) {
                inner.entries.insert(key, entry);
            } else {
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::debug!(store = %self.id, due, evicted, "expired entries evicted");
        }
        evicted
    }

    // --- Internals ---

    /// Total weight, `None` when it does not fit in a `u64`.
    fn weigh(&self, inner: &Inner<V>) -> Option<u64> {
        inner
            .entries
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add((self.calc_size)(v)))
    }

    fn try_insert(&self, inner: &mut Inner<V>, id: Uuid, value: V) -> Result<(), StoreError> {
        if !inner.entries.contains_key(&id) && inner.entries.len() + 1 > self.config.max_length {
            return Err(StoreError::CountCapacity {
                max_length: self.config.max_length,
            });
        }

        let budget = self.total_budget();
        let total = self
            .weigh(inner)
            .and_then(|size| size.checked_add((self.calc_size)(&value)));
        if total.map_or(true, |total| total > budget) {
            return Err(StoreError::SizeCapacity { budget });
        }

        inner.entries.insert(id, value);
        Ok(())
    }
}

impl<V> std::fmt::Debug for DataStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
