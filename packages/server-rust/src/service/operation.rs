//! Operations and their invocation pipeline.
//!
//! One invocation is a single pass with no retries:
//!
//! 1. **Classify** declared inputs (on construction): positional descriptors,
//!    named descriptors, return descriptor (echo by default)
//! 2. **Validate positional** values in declared order, fail fast
//! 3. **Validate named** values for declared keys, undeclared keys ignored
//! 4. **Bind** against the handler [`Signature`], applying defaults
//! 5. **Invoke** the handler
//! 6. **Shape** the output through the return descriptor
//!
//! [`Operation::run`] is the non-throwing boundary: every failure, panics
//! included, comes back as an error envelope.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use indexmap::IndexMap;
use ledgerbridge_core::{ServiceError, ServiceParams, ServiceResult};
use serde_json::{json, Map, Value};

use super::descriptor::{BoxFuture, DescriptorMeta, ParamDescriptor, ReturnDescriptor};
use super::signature::{Arguments, BindError, Signature};
use crate::storage::StoreError;

/// Uniform contract for an operation's target function.
pub type HandlerFn =
    Arc<dyn Fn(Arguments) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Adapts a plain function to the [`HandlerFn`] contract.
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |args| {
        let out = f(args);
        Box::pin(async move { out })
    })
}

/// Adapts an async function to the [`HandlerFn`] contract.
pub fn async_handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// DeclaredInput
// ---------------------------------------------------------------------------

/// An unclassified input as supplied to [`Operation::new`].
#[derive(Debug, Clone)]
pub enum DeclaredInput {
    Positional(ParamDescriptor),
    Return(ReturnDescriptor),
}

impl From<ParamDescriptor> for DeclaredInput {
    fn from(desc: ParamDescriptor) -> Self {
        Self::Positional(desc)
    }
}

impl From<ReturnDescriptor> for DeclaredInput {
    fn from(desc: ReturnDescriptor) -> Self {
        Self::Return(desc)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A named, introspectable unit of work.
pub struct Operation {
    meta: DescriptorMeta,
    positional: Vec<ParamDescriptor>,
    named: IndexMap<String, ParamDescriptor>,
    returns: ReturnDescriptor,
    signature: Signature,
    handler: HandlerFn,
}

impl Operation {
    /// Classifies `inputs` into positional descriptors and a return
    /// descriptor (the last declared return wins) and derives a signature.
    ///
    /// The derived signature has one positional-or-keyword parameter per
    /// positional descriptor (required unless the descriptor has a default)
    /// and one keyword-only parameter per named descriptor, defaulting to the
    /// descriptor's default or `null`. Positional slots are named after their
    /// descriptor; a name already used by an earlier slot or a named key gets
    /// a `_2`, `_3`, ... suffix, and every slot can also be read by index
    /// with [`Arguments::nth`].
    pub fn new(
        name: impl Into<String>,
        handler: HandlerFn,
        inputs: Vec<DeclaredInput>,
        named: Vec<(String, ParamDescriptor)>,
    ) -> Self {
        let mut positional = Vec::new();
        let mut returns = None;
        for input in inputs {
            match input {
                DeclaredInput::Positional(desc) => positional.push(desc),
                DeclaredInput::Return(desc) => returns = Some(desc),
            }
        }
        let named: IndexMap<String, ParamDescriptor> = named.into_iter().collect();
        let signature = derive_signature(&positional, &named);

        Self {
            meta: DescriptorMeta {
                name: name.into(),
                type_label: String::new(),
                description: String::new(),
            },
            positional,
            named,
            returns: returns.unwrap_or_else(ReturnDescriptor::echo),
            signature,
            handler,
        }
    }

    /// Starts a builder for an operation called `name`.
    pub fn builder(name: impl Into<String>) -> OperationBuilder {
        OperationBuilder {
            name: name.into(),
            type_label: String::new(),
            description: String::new(),
            inputs: Vec::new(),
            named: Vec::new(),
            signature: None,
        }
    }

    #[must_use]
    pub fn meta(&self) -> &DescriptorMeta {
        &self.meta
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    #[must_use]
    pub fn positional(&self) -> &[ParamDescriptor] {
        &self.positional
    }

    #[must_use]
    pub fn named(&self) -> &IndexMap<String, ParamDescriptor> {
        &self.named
    }

    #[must_use]
    pub fn returns(&self) -> &ReturnDescriptor {
        &self.returns
    }

    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Describes the operation and its descriptors.
    #[must_use]
    pub fn info(&self) -> Value {
        let mut obj = match self.meta.to_dict() {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        obj.insert(
            "parameters".to_string(),
            Value::Array(self.positional.iter().map(|d| d.meta().to_dict()).collect()),
        );
        obj.insert(
            "parameterskv".to_string(),
            Value::Object(
                self.named
                    .iter()
                    .map(|(k, d)| (k.clone(), d.meta().to_dict()))
                    .collect(),
            ),
        );
        obj.insert("return".to_string(), self.returns.meta().to_dict());
        Value::Object(obj)
    }

    /// Non-throwing entry point: always yields an envelope.
    pub async fn run(&self, params: ServiceParams) -> ServiceResult {
        match self.invoke(params).await {
            Ok(result) => result,
            Err(err) => ServiceResult::from_error(&err),
        }
    }

    /// Runs the pipeline, converting a panic anywhere inside it into an
    /// execution error.
    ///
    /// # Errors
    ///
    /// Any pipeline failure, as a [`ServiceError`].
    pub async fn invoke(&self, params: ServiceParams) -> Result<ServiceResult, ServiceError> {
        let outcome = std::panic::AssertUnwindSafe(self.exec(params))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(ServiceError::execution(format!(
                    "error executing operation '{}': {}",
                    self.name(),
                    panic_message(payload.as_ref())
                )))
            });

        if let Err(err) = &outcome {
            tracing::debug!(
                operation = %self.name(),
                kind = %err.kind(),
                error = %err,
                "operation failed"
            );
        }
        outcome
    }

    /// Steps 2-6 of the pipeline.
    ///
    /// # Errors
    ///
    /// The first failing step's error.
    pub async fn exec(&self, params: ServiceParams) -> Result<ServiceResult, ServiceError> {
        let ServiceParams {
            parameters,
            parameterskv,
        } = params;

        let args = self.exec_args(parameters).await?;
        let kwargs = self.exec_kwargs(parameterskv).await?;
        let bound = self.bind(args, kwargs)?;
        let output = self.exec_handler(bound).await?;
        self.returns.run(output).await
    }

    async fn exec_args(&self, values: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        let mut coerced = Vec::with_capacity(values.len().min(self.positional.len()));
        for (value, desc) in values.into_iter().zip(&self.positional) {
            coerced.push(desc.run(Some(value)).await?.data);
        }
        Ok(coerced)
    }

    async fn exec_kwargs(
        &self,
        mut values: IndexMap<String, Value>,
    ) -> Result<IndexMap<String, Value>, ServiceError> {
        let mut coerced = IndexMap::new();
        for (key, desc) in &self.named {
            if let Some(value) = values.swap_remove(key) {
                coerced.insert(key.clone(), desc.run(Some(value)).await?.data);
            }
        }
        Ok(coerced)
    }

    fn bind(
        &self,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    ) -> Result<Arguments, ServiceError> {
        self.signature.bind(args, kwargs).map_err(|err| match err {
            BindError::Missing(name) => ServiceError::param(format!(
                "argument required for parameter '{name}' of operation '{}'",
                self.name()
            )),
            other => ServiceError::param(other.to_string()),
        })
    }

    async fn exec_handler(&self, args: Arguments) -> Result<Value, ServiceError> {
        (self.handler)(args).await.map_err(|err| {
            if let Some(service_err) = err.downcast_ref::<ServiceError>() {
                if matches!(service_err, ServiceError::Param(_)) {
                    return service_err.clone();
                }
            }
            if let Some(store_err) = err.downcast_ref::<StoreError>() {
                if store_err.is_capacity() {
                    return ServiceError::capacity(store_err.to_string());
                }
            }
            ServiceError::execution(format!(
                "error executing operation '{}': {err}",
                self.name()
            ))
        })
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("meta", &self.meta)
            .field("positional", &self.positional)
            .field("named", &self.named)
            .field("returns", &self.returns)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

fn derive_signature(
    positional: &[ParamDescriptor],
    named: &IndexMap<String, ParamDescriptor>,
) -> Signature {
    let mut taken: HashSet<String> = named.keys().cloned().collect();
    let mut signature = Signature::new();
    for desc in positional {
        let slot = unique_slot(desc.name(), &mut taken);
        signature = match desc.default_value() {
            Some(default) => signature.optional(slot, default.clone()),
            None => signature.required(slot),
        };
    }
    for (key, desc) in named {
        let default = desc.default_value().cloned().unwrap_or(Value::Null);
        signature = signature.keyword(key.clone(), Some(default));
    }
    signature
}

/// `name`, or `name_2`, `name_3`, ... when already taken.
fn unique_slot(name: &str, taken: &mut HashSet<String>) -> String {
    let mut slot = name.to_string();
    let mut n = 2;
    while taken.contains(&slot) {
        slot = format!("{name}_{n}");
        n += 1;
    }
    taken.insert(slot.clone());
    slot
}

// ---------------------------------------------------------------------------
// OperationBuilder
// ---------------------------------------------------------------------------

/// Declarative construction of an [`Operation`].
#[derive(Debug)]
pub struct OperationBuilder {
    name: String,
    type_label: String,
    description: String,
    inputs: Vec<DeclaredInput>,
    named: Vec<(String, ParamDescriptor)>,
    signature: Option<Signature>,
}

impl OperationBuilder {
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn type_label(mut self, type_label: impl Into<String>) -> Self {
        self.type_label = type_label.into();
        self
    }

    /// Appends a positional descriptor.
    #[must_use]
    pub fn param(mut self, desc: ParamDescriptor) -> Self {
        self.inputs.push(DeclaredInput::Positional(desc));
        self
    }

    /// Declares a named descriptor under `key`.
    #[must_use]
    pub fn named(mut self, key: impl Into<String>, desc: ParamDescriptor) -> Self {
        self.named.push((key.into(), desc));
        self
    }

    /// Sets the return descriptor.
    #[must_use]
    pub fn returns(mut self, desc: ReturnDescriptor) -> Self {
        self.inputs.push(DeclaredInput::Return(desc));
        self
    }

    /// Overrides the derived handler signature.
    #[must_use]
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Finishes the operation around `handler`.
    pub fn build(self, handler: HandlerFn) -> Operation {
        let mut op = Operation::new(self.name, handler, self.inputs, self.named);
        op.meta.type_label = self.type_label;
        op.meta.description = self.description;
        if let Some(signature) = self.signature {
            op.signature = signature;
        }
        op
    }
}

/// Shorthand for a successful echo-shaped envelope, used by handlers that
/// want to return already-shaped data.
#[must_use]
pub fn typed(data: Value, kind: &str) -> Value {
    json!({ "data": data, "type": kind })
}

#[cfg(test)]
mod tests {
    use ledgerbridge_core::ErrorKind;
    use proptest::prelude::*;

    use super::*;
    use crate::service::common::params;
    use crate::service::descriptor::sync_fn;
    use crate::storage::{DataStore, DataStoreConfig};

    fn number() -> ParamDescriptor {
        ParamDescriptor::new(
            "number",
            "number",
            sync_fn(|v| {
                if v.is_number() {
                    Ok(v)
                } else {
                    anyhow::bail!("value must be a number")
                }
            }),
        )
    }

    fn doubled() -> ReturnDescriptor {
        ReturnDescriptor::new(
            "doubled",
            "number",
            sync_fn(|v| {
                let n = v.as_i64().unwrap_or_default();
                Ok(typed(json!(n * 2), "number"))
            }),
        )
    }

    fn add() -> Operation {
        Operation::builder("add")
            .describe("Adds two numbers.")
            .param(number().renamed("a"))
            .param(number().renamed("b").with_default(json!(10)))
            .build(handler(|args| {
                let a: i64 = args.value("a")?;
                let b: i64 = args.value("b")?;
                Ok(json!(a + b))
            }))
    }

    #[tokio::test]
    async fn echo_return_by_default() {
        let result = add().run(ServiceParams::positional(vec![json!(1), json!(2)])).await;
        assert_eq!(result, ServiceResult::new(json!(3), "number"));
    }

    #[tokio::test]
    async fn defaults_fill_missing_positional() {
        let result = add().run(ServiceParams::positional(vec![json!(5)])).await;
        assert_eq!(result.data, json!(15));
    }

    #[tokio::test]
    async fn extra_positional_values_are_dropped() {
        let result = add()
            .run(ServiceParams::positional(vec![json!(1), json!(2), json!(3)]))
            .await;
        assert_eq!(result.data, json!(3));
    }

    #[tokio::test]
    async fn missing_required_argument_names_parameter() {
        let op = Operation::builder("get")
            .param(number().renamed("dataid"))
            .build(handler(|_| Ok(Value::Null)));

        let result = op.run(ServiceParams::default()).await;
        assert_eq!(result.data, Value::Null);
        assert_eq!(result.kind, "ParamError");
        assert!(result.errs.unwrap().contains("'dataid'"));
    }

    #[tokio::test]
    async fn positional_validation_fails_fast() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counted = {
            let calls = Arc::clone(&calls);
            ParamDescriptor::new(
                "second",
                "any",
                sync_fn(move |v| {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(v)
                }),
            )
        };
        let op = Operation::builder("pair")
            .param(number().renamed("first"))
            .param(counted)
            .build(handler(|_| Ok(Value::Null)));

        let result = op
            .run(ServiceParams::positional(vec![json!("x"), json!(1)]))
            .await;
        assert_eq!(result.kind, "ParamError");
        assert_eq!(
            result.errs.as_deref(),
            Some("error in parameter 'first': value must be a number")
        );
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_descriptor_names_bind_by_position() {
        let op = Operation::builder("concat")
            .param(params::string())
            .param(params::string())
            .build(handler(|args| {
                let first: String = args.nth(0)?;
                let second: String = args.value("string_2")?;
                Ok(json!(format!("{first}{second}")))
            }));

        assert_eq!(op.signature().params()[1].name, "string_2");
        let result = op
            .run(ServiceParams::positional(vec![json!("a"), json!("b")]))
            .await;
        assert_eq!(result, ServiceResult::new(json!("ab"), "string"));
    }

    #[tokio::test]
    async fn positional_name_clashing_with_named_key_gets_own_slot() {
        let op = Operation::builder("scale")
            .param(number().renamed("factor"))
            .named("factor", number().with_default(json!(2)))
            .build(handler(|args| {
                let value: i64 = args.nth(0)?;
                let factor: i64 = args.value("factor")?;
                Ok(json!(value * factor))
            }));

        let params = ServiceParams::positional(vec![json!(5)]).with_named("factor", json!(3));
        assert_eq!(op.run(params).await.data, json!(15));
        assert_eq!(
            op.run(ServiceParams::positional(vec![json!(5)])).await.data,
            json!(10)
        );
    }

    #[tokio::test]
    async fn named_values_are_validated_in_declaration_order() {
        let op = Operation::builder("window")
            .named("start", number().renamed("start"))
            .named("end", number().renamed("end"))
            .build(handler(|_| Ok(Value::Null)));
        let params = ServiceParams::default()
            .with_named("end", json!("late"))
            .with_named("start", json!("early"));
        let result = op.run(params).await;
        assert_eq!(result.kind, "ParamError");
        assert_eq!(
            result.errs.as_deref(),
            Some("error in parameter 'start': value must be a number")
        );
    }

    #[tokio::test]
    async fn undeclared_named_keys_are_ignored() {
        let op = Operation::builder("scale")
            .param(number().renamed("value"))
            .named("factor", number().with_default(json!(1)))
            .build(handler(|args| {
                let value: i64 = args.value("value")?;
                let factor: i64 = args.value("factor")?;
                Ok(json!(value * factor))
            }));

        let params = ServiceParams::positional(vec![json!(4)])
            .with_named("factor", json!(3))
            .with_named("unknown", json!("ignored"));
        assert_eq!(op.run(params).await.data, json!(12));

        let params = ServiceParams::positional(vec![json!(4)]);
        assert_eq!(op.run(params).await.data, json!(4));

        let params = ServiceParams::positional(vec![json!(4)]).with_named("factor", json!("x"));
        assert_eq!(op.run(params).await.kind, "ParamError");
    }

    #[tokio::test]
    async fn explicit_return_descriptor_shapes_output() {
        let op = Operation::builder("twice")
            .param(number())
            .returns(doubled())
            .build(handler(|args| args.value::<Value>("number")));
        let result = op.run(ServiceParams::positional(vec![json!(21)])).await;
        assert_eq!(result, ServiceResult::new(json!(42), "number"));
    }

    #[tokio::test]
    async fn last_declared_return_wins() {
        let op = Operation::new(
            "id",
            handler(|_| Ok(json!(1))),
            vec![
                DeclaredInput::from(doubled()),
                DeclaredInput::from(ReturnDescriptor::echo()),
            ],
            Vec::new(),
        );
        assert_eq!(op.returns().name(), "return");
        assert_eq!(op.run(ServiceParams::default()).await.data, json!(1));
    }

    #[tokio::test]
    async fn handler_failure_becomes_execution_error() {
        let op = Operation::builder("explode")
            .build(handler(|_| anyhow::bail!("disk on fire")));
        let result = op.run(ServiceParams::default()).await;
        assert_eq!(result.kind, "ExecutionError");
        assert_eq!(
            result.errs.as_deref(),
            Some("error executing operation 'explode': disk on fire")
        );
    }

    #[tokio::test]
    async fn handler_param_error_is_preserved() {
        let op = Operation::builder("strict").build(handler(|_| {
            Err(ServiceError::param("dataid must be a UUID").into())
        }));
        let result = op.run(ServiceParams::default()).await;
        assert_eq!(result.kind, ErrorKind::ParamError.as_str());
        assert_eq!(result.errs.as_deref(), Some("dataid must be a UUID"));
    }

    #[tokio::test]
    async fn store_capacity_failure_becomes_capacity_error() {
        let store: Arc<DataStore<Value>> = Arc::new(DataStore::new(DataStoreConfig {
            max_length: 1,
            ..DataStoreConfig::default()
        }));
        store.append(json!("first"), false).unwrap();

        let op = {
            let store = Arc::clone(&store);
            Operation::builder("put").build(handler(move |_| {
                let id = store.append(json!("second"), false)?;
                Ok(json!(id.to_string()))
            }))
        };
        let result = op.run(ServiceParams::default()).await;
        assert_eq!(result.kind, "CapacityError");
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let op = Operation::builder("panics").build(handler(|_| panic!("unreachable state")));
        let result = op.run(ServiceParams::default()).await;
        assert_eq!(result.kind, "ExecutionError");
        assert_eq!(
            result.errs.as_deref(),
            Some("error executing operation 'panics': unreachable state")
        );
    }

    #[tokio::test]
    async fn async_handlers_are_awaited() {
        let op = Operation::builder("later").build(async_handler(|_| async {
            tokio::task::yield_now().await;
            Ok(json!("done"))
        }));
        assert_eq!(
            op.run(ServiceParams::default()).await,
            ServiceResult::new(json!("done"), "string")
        );
    }

    #[tokio::test]
    async fn binding_mismatch_is_param_error() {
        let op = Operation::builder("strict")
            .param(number())
            .signature(Signature::new())
            .build(handler(|_| Ok(Value::Null)));
        let result = op.run(ServiceParams::positional(vec![json!(1)])).await;
        assert_eq!(result.kind, "ParamError");
        assert_eq!(
            result.errs.as_deref(),
            Some("too many positional arguments: expected at most 0, got 1")
        );
    }

    #[test]
    fn info_lists_descriptors() {
        let info = add().info();
        assert_eq!(info["name"], json!("add"));
        assert_eq!(info["desc"], json!("Adds two numbers."));
        assert_eq!(info["parameters"][0]["name"], json!("a"));
        assert_eq!(info["parameters"][1]["name"], json!("b"));
        assert_eq!(info["return"]["name"], json!("return"));
        assert_eq!(info["parameterskv"], json!({}));
    }

    proptest! {
        #[test]
        fn run_always_yields_an_envelope(
            values in proptest::collection::vec(
                prop_oneof![
                    any::<i64>().prop_map(|n| json!(n)),
                    "[a-z]{0,6}".prop_map(|s| json!(s)),
                    Just(Value::Null),
                ],
                0..4,
            ),
            named in proptest::collection::vec(("[a-z]{1,6}", any::<bool>()), 0..3),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let mut params = ServiceParams::positional(values);
            for (k, v) in named {
                params = params.with_named(k, json!(v));
            }
            let result = runtime.block_on(add().run(params));
            let doc = result.clone().into_value();
            prop_assert!(ServiceResult::from_value(&doc).is_some());
            prop_assert_eq!(result.errs.is_some(), result.data.is_null());
        }
    }
}
