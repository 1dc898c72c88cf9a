//! Artifact service: opaque JSON artifacts cached in a [`DataStore`].
//!
//! Operations: `create`, `getall`, `get`, `pop` and `persistent`, exposed as
//! service `artifacts`.

use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use crate::service::common::{params, returns, IndexSlice};
use crate::service::descriptor::{sync_fn, ParamDescriptor};
use crate::service::operation::{handler, Operation};
use crate::service::registry::ServiceNode;
use crate::storage::{DataStore, DataStoreConfig, DataStoreRegistry, StoreError};

pub const SERVICE_NAME: &str = "artifacts";

/// Weight of an artifact: the length of its JSON encoding.
fn encoded_len(value: &Value) -> u64 {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len() as u64)
}

fn dataid() -> ParamDescriptor {
    params::uuid()
        .renamed("dataid")
        .describe("Identifier of the artifact.")
}

fn payload() -> ParamDescriptor {
    ParamDescriptor::new("payload", "type[object]", sync_fn(Ok))
        .describe("Artifact contents, any JSON value.")
}

// ---------------------------------------------------------------------------
// ArtifactService
// ---------------------------------------------------------------------------

pub struct ArtifactService {
    store: Arc<DataStore<Value>>,
}

impl ArtifactService {
    /// Creates the backing store in `registry`.
    #[must_use]
    pub fn new(registry: &DataStoreRegistry, config: DataStoreConfig) -> Self {
        let store = registry.register(DataStore::with_calc_size(config, encoded_len));
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<DataStore<Value>> {
        &self.store
    }

    /// Stores `payload`, under `dataid` when given.
    ///
    /// # Errors
    ///
    /// Capacity errors from the store.
    pub fn create(
        &self,
        payload: Value,
        dataid: Option<Uuid>,
        force: bool,
    ) -> Result<Uuid, StoreError> {
        let id = self.store.append(payload, force)?;
        let Some(dataid) = dataid else {
            return Ok(id);
        };
        let value = self.store.remove(&id)?;
        self.store.set(dataid, value)?;
        Ok(dataid)
    }

    /// Artifact ids in insertion order, optionally sliced.
    ///
    /// # Errors
    ///
    /// Fails on a zero slice step.
    pub fn getall(&self, index: Option<IndexSlice>) -> anyhow::Result<Vec<Uuid>> {
        let ids = self.store.ids();
        match index {
            Some(slice) => slice.apply(&ids),
            None => Ok(ids),
        }
    }

    /// # Errors
    ///
    /// [`StoreError::NotFound`] for unknown ids.
    pub fn get(&self, dataid: &Uuid) -> Result<Value, StoreError> {
        self.store.get(dataid)
    }

    /// Removes `dataid`, or the newest artifact when `None`. Missing ids are
    /// ignored. Returns the exit status.
    pub fn pop(&self, dataid: Option<Uuid>) -> i64 {
        let target = dataid.or_else(|| self.store.ids().last().copied());
        if let Some(id) = target {
            // Unknown ids are not an error here.
            let _ = self.store.remove(&id);
            self.store.unpin(&id);
        }
        0
    }

    /// Flips the persistent mark of `dataid`. Returns the exit status.
    pub fn persistent(&self, dataid: Uuid) -> i64 {
        let pinned = self.store.toggle_persistent(dataid);
        tracing::debug!(%dataid, pinned, "artifact persistence toggled");
        0
    }

    /// The operations of this service, sharing `self`.
    #[must_use]
    pub fn operations(self: &Arc<Self>) -> Vec<Operation> {
        let create = {
            let svc = Arc::clone(self);
            Operation::builder("create")
                .describe("Stores an artifact and returns its id.")
                .param(payload())
                .named("dataid", params::optional(dataid()))
                .named(
                    "force",
                    params::boolean()
                        .renamed("force")
                        .describe("Evict older artifacts to make room.")
                        .with_default(json!(false)),
                )
                .returns(returns::uuid())
                .build(handler(move |args| {
                    let id = svc.create(
                        args.value("payload")?,
                        args.optional("dataid")?,
                        args.value("force")?,
                    )?;
                    Ok(json!(id))
                }))
        };

        let getall = {
            let svc = Arc::clone(self);
            Operation::builder("getall")
                .describe("Lists artifact ids, optionally sliced.")
                .param(params::optional(params::index()))
                .returns(returns::uuids())
                .build(handler(move |args| {
                    Ok(json!(svc.getall(args.optional("index")?)?))
                }))
        };

        let get = {
            let svc = Arc::clone(self);
            Operation::builder("get")
                .describe("Returns the artifact with the given id.")
                .param(dataid())
                .returns(returns::default())
                .build(handler(move |args| Ok(svc.get(&args.value("dataid")?)?)))
        };

        let pop = {
            let svc = Arc::clone(self);
            Operation::builder("pop")
                .describe("Removes an artifact by id, or the newest one.")
                .param(params::optional(dataid()))
                .returns(returns::exitstatus())
                .build(handler(move |args| Ok(json!(svc.pop(args.optional("dataid")?)))))
        };

        let persistent = {
            let svc = Arc::clone(self);
            Operation::builder("persistent")
                .describe("Toggles whether an artifact is exempt from eviction.")
                .param(dataid())
                .returns(returns::exitstatus())
                .build(handler(move |args| Ok(json!(svc.persistent(args.value("dataid")?)))))
        };

        vec![create, getall, get, pop, persistent]
    }

    /// Service node holding [`operations`](Self::operations).
    #[must_use]
    pub fn node(self: &Arc<Self>) -> ServiceNode {
        ServiceNode::service(SERVICE_NAME, self.operations())
            .describe("Cache of JSON artifacts addressed by id.")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
