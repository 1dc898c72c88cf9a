//! Parameter and return descriptors.
//!
//! A descriptor wraps one transformation function together with the metadata
//! shown by introspection (name, declared type label, description). Every
//! wrapped function goes through the same may-suspend contract
//! ([`ValueFn`]): synchronous functions are adapted with [`sync_fn`], async
//! ones with [`async_fn`], and the pipeline awaits both the same way.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ledgerbridge_core::{type_name, ServiceError, ServiceResult};
use serde_json::{json, Map, Value};

/// Boxed, sendable future used for every suspension point in the pipeline.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Uniform contract for a wrapped single-value function.
pub type ValueFn = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Type label reported by a parameter descriptor's own envelope.
pub const PARAM_RESULT_TYPE: &str = "descriptor";

/// Adapts a plain function to the [`ValueFn`] contract.
pub fn sync_fn<F>(f: F) -> ValueFn
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(move |value| {
        let out = f(value);
        Box::pin(async move { out })
    })
}

/// Adapts an async function to the [`ValueFn`] contract.
pub fn async_fn<F, Fut>(f: F) -> ValueFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

// ---------------------------------------------------------------------------
// DescriptorMeta
// ---------------------------------------------------------------------------

/// Introspection metadata shared by both descriptor kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorMeta {
    pub name: String,
    pub type_label: String,
    pub description: String,
}

impl DescriptorMeta {
    /// `{name, type?, desc?}`; empty labels are omitted.
    #[must_use]
    pub fn to_dict(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!(self.name));
        if !self.type_label.is_empty() {
            obj.insert("type".to_string(), json!(self.type_label));
        }
        if !self.description.is_empty() {
            obj.insert("desc".to_string(), json!(self.description));
        }
        Value::Object(obj)
    }
}

// ---------------------------------------------------------------------------
// ParamDescriptor
// ---------------------------------------------------------------------------

/// Validates and coerces a single input value.
#[derive(Clone)]
pub struct ParamDescriptor {
    meta: DescriptorMeta,
    func: ValueFn,
    default: Option<Value>,
}

impl ParamDescriptor {
    /// Creates a descriptor around `func`.
    pub fn new(name: impl Into<String>, type_label: impl Into<String>, func: ValueFn) -> Self {
        Self {
            meta: DescriptorMeta {
                name: name.into(),
                type_label: type_label.into(),
                description: String::new(),
            },
            func,
            default: None,
        }
    }

    /// Sets the description shown by introspection.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    /// Value used when the caller supplies nothing.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Same descriptor under another name.
    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
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
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn func(&self) -> &ValueFn {
        &self.func
    }

    /// Runs the wrapped function, wrapping its output as
    /// `{data: value, type: "descriptor"}`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Param`] prefixed with the descriptor name when no
    /// value and no default is available, or when the function fails.
    pub async fn run(&self, value: Option<Value>) -> Result<ServiceResult, ServiceError> {
        let value = self.coerce(value).await?;
        Ok(ServiceResult::new(value, PARAM_RESULT_TYPE))
    }

    /// Runs the wrapped function and returns the bare coerced value.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn coerce(&self, value: Option<Value>) -> Result<Value, ServiceError> {
        let Some(value) = value.or_else(|| self.default.clone()) else {
            return Err(ServiceError::param(format!(
                "expected a valid argument for parameter '{}: {}'",
                self.meta.name, self.meta.type_label
            )));
        };

        (self.func)(value).await.map_err(|err| {
            ServiceError::param(format!("error in parameter '{}': {err}", self.meta.name))
        })
    }
}

impl std::fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("meta", &self.meta)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ReturnDescriptor
// ---------------------------------------------------------------------------

/// Shapes a raw operation output into a [`ServiceResult`].
///
/// The wrapped function must itself produce a well-formed envelope document;
/// anything else is reported as a parameter error naming this descriptor.
#[derive(Clone)]
pub struct ReturnDescriptor {
    meta: DescriptorMeta,
    func: ValueFn,
}

impl ReturnDescriptor {
    pub fn new(name: impl Into<String>, type_label: impl Into<String>, func: ValueFn) -> Self {
        Self {
            meta: DescriptorMeta {
                name: name.into(),
                type_label: type_label.into(),
                description: String::new(),
            },
            func,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.meta.description = description.into();
        self
    }

    #[must_use]
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    /// Default return: echoes the raw value with its runtime type name.
    #[must_use]
    pub fn echo() -> Self {
        Self::new(
            "return",
            "type[object]",
            sync_fn(|value| {
                let kind = type_name(&value);
                Ok(ServiceResult::new(value, kind).into_value())
            }),
        )
        .describe("Returns the operation output unchanged, typed by its runtime type.")
    }

    #[must_use]
    pub fn meta(&self) -> &DescriptorMeta {
        &self.meta
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Shapes `value` into the final envelope.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Param`] when the function fails or its output is not
    /// an envelope.
    pub async fn run(&self, value: Value) -> Result<ServiceResult, ServiceError> {
        let shaped = (self.func)(value).await.map_err(|err| {
            ServiceError::param(format!(
                "error computing the return '{}': {err}",
                self.meta.name
            ))
        })?;

        ServiceResult::from_value(&shaped).ok_or_else(|| {
            ServiceError::param(format!(
                "the return value must be a ServiceResult: '{}'",
                self.meta.name
            ))
        })
    }
}

impl std::fmt::Debug for ReturnDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnDescriptor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
