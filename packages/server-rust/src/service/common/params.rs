//! Common parameter descriptors.

use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::service::descriptor::{sync_fn, BoxFuture, ParamDescriptor};

/// Any string.
#[must_use]
pub fn string() -> ParamDescriptor {
    ParamDescriptor::new(
        "string",
        "string",
        sync_fn(|value| match value {
            Value::String(_) => Ok(value),
            _ => bail!("value must be of type 'string'"),
        }),
    )
    .describe("Receives a string.")
}

/// Non-empty string.
#[must_use]
pub fn raw() -> ParamDescriptor {
    ParamDescriptor::new(
        "raw",
        "string",
        sync_fn(|value| match &value {
            Value::String(s) if !s.is_empty() => Ok(value),
            _ => bail!("value must be a non-empty 'string'"),
        }),
    )
    .describe("Receives a string that must not be empty.")
}

#[must_use]
pub fn boolean() -> ParamDescriptor {
    ParamDescriptor::new(
        "boolean",
        "boolean",
        sync_fn(|value| match value {
            Value::Bool(_) => Ok(value),
            _ => bail!("value must be of type 'boolean'"),
        }),
    )
    .describe("Receives a boolean.")
}

/// UUID string, normalized to its hyphenated lowercase form.
#[must_use]
pub fn uuid() -> ParamDescriptor {
    ParamDescriptor::new(
        "uuid",
        "string[UUID]",
        sync_fn(|value| {
            if let Some(Ok(id)) = value.as_str().map(Uuid::parse_str) {
                return Ok(Value::String(id.to_string()));
            }
            bail!("value must be a 'string[UUID]'")
        }),
    )
    .describe("Receives a UUID string.")
}

/// `end` or `[start, end, step]`, coerced to an [`IndexSlice`].
#[must_use]
pub fn index() -> ParamDescriptor {
    ParamDescriptor::new(
        "index",
        "end | [start, end, step]",
        sync_fn(|value| {
            let slice = IndexSlice::from_value(&value)?;
            Ok(serde_json::to_value(slice)?)
        }),
    )
    .describe("Receives an end index or a list composing a slice.")
}

/// Array of strings.
#[must_use]
pub fn fields() -> ParamDescriptor {
    ParamDescriptor::new(
        "fields",
        "string[]",
        sync_fn(|value| match &value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(value),
            Value::Array(_) => bail!("the array must contain only strings"),
            _ => bail!("value must be an array of strings"),
        }),
    )
    .describe("Receives a list of field names.")
}

/// Makes `param` accept null (and absence), passing it through unchanged.
#[must_use]
pub fn optional(param: ParamDescriptor) -> ParamDescriptor {
    let inner = Arc::clone(param.func());
    let meta = param.meta().clone();
    ParamDescriptor::new(
        meta.name,
        meta.type_label,
        Arc::new(move |value: Value| -> BoxFuture<'static, anyhow::Result<Value>> {
            if value.is_null() {
                Box::pin(async { Ok(Value::Null) })
            } else {
                inner(value)
            }
        }),
    )
    .describe(meta.description)
    .with_default(Value::Null)
}

// ---------------------------------------------------------------------------
// IndexSlice
// ---------------------------------------------------------------------------

/// Slice bounds with sequence-slicing semantics: negative positions count
/// from the end, out-of-range bounds are clamped, `step` may be negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSlice {
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub step: Option<i64>,
}

impl IndexSlice {
    /// Everything up to `end`.
    #[must_use]
    pub fn until(end: i64) -> Self {
        Self {
            end: Some(end),
            ..Self::default()
        }
    }

    /// Parses `end` or `[start, end?, step?]`.
    ///
    /// # Errors
    ///
    /// Fails on anything else, or when a component is not an integer.
    pub fn from_value(value: &Value) -> anyhow::Result<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(end) => Ok(Self::until(end)),
                None => bail!("index values must be integers"),
            },
            Value::Array(items) if (1..=3).contains(&items.len()) => {
                let mut parts = [None; 3];
                for (slot, item) in parts.iter_mut().zip(items) {
                    match item.as_i64() {
                        Some(n) => *slot = Some(n),
                        None => bail!("index values must be integers"),
                    }
                }
                let [start, end, step] = parts;
                if items.len() == 1 {
                    return Ok(Self::until(start.unwrap_or_default()));
                }
                Ok(Self { start, end, step })
            }
            _ => bail!("index must be an integer or a list of up to three integers"),
        }
    }

    /// Selects the matching items of `items`.
    ///
    /// # Errors
    ///
    /// Fails when `step` is zero.
    pub fn apply<T: Clone>(&self, items: &[T]) -> anyhow::Result<Vec<T>> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            bail!("slice step cannot be zero");
        }
        let len = i64::try_from(items.len())?;
        let resolve = |bound: i64, low: i64, high: i64| {
            let bound = if bound < 0 { bound + len } else { bound };
            bound.clamp(low, high)
        };

        let mut out = Vec::new();
        if step > 0 {
            let start = self.start.map_or(0, |s| resolve(s, 0, len));
            let end = self.end.map_or(len, |e| resolve(e, 0, len));
            let mut i = start;
            while i < end {
                out.push(items[usize::try_from(i)?].clone());
                i += step;
            }
        } else {
            let start = self.start.map_or(len - 1, |s| resolve(s, -1, len - 1));
            let end = self.end.map_or(-1, |e| resolve(e, -1, len - 1));
            let mut i = start;
            while i > end {
                out.push(items[usize::try_from(i)?].clone());
                i += step;
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn string_and_raw() {
        assert_eq!(string().coerce(Some(json!(""))).await.unwrap(), json!(""));
        assert!(string().coerce(Some(json!(1))).await.is_err());
        assert!(raw().coerce(Some(json!(""))).await.is_err());
        assert_eq!(raw().coerce(Some(json!("x"))).await.unwrap(), json!("x"));
    }

    #[tokio::test]
    async fn boolean_rejects_truthy_values() {
        assert_eq!(boolean().coerce(Some(json!(true))).await.unwrap(), json!(true));
        let err = boolean().coerce(Some(json!(1))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "error in parameter 'boolean': value must be of type 'boolean'"
        );
    }

    #[tokio::test]
    async fn uuid_is_normalized() {
        let id = Uuid::new_v4();
        let upper = id.to_string().to_uppercase();
        assert_eq!(
            uuid().coerce(Some(json!(upper))).await.unwrap(),
            json!(id.to_string())
        );
        assert!(uuid().coerce(Some(json!("not-a-uuid"))).await.is_err());
        assert!(uuid().coerce(Some(json!(7))).await.is_err());
    }

    #[tokio::test]
    async fn fields_requires_strings() {
        assert!(fields().coerce(Some(json!(["a", "b"]))).await.is_ok());
        assert!(fields().coerce(Some(json!(["a", 1]))).await.is_err());
        assert!(fields().coerce(Some(json!("a"))).await.is_err());
    }

    #[tokio::test]
    async fn optional_passes_null_through() {
        let desc = optional(uuid().renamed("dataid"));
        assert_eq!(desc.name(), "dataid");
        assert_eq!(desc.meta().type_label, "string[UUID]");
        assert_eq!(desc.coerce(None).await.unwrap(), Value::Null);
        assert_eq!(desc.coerce(Some(Value::Null)).await.unwrap(), Value::Null);
        assert!(desc.coerce(Some(json!("bad"))).await.is_err());
    }

    #[tokio::test]
    async fn index_coerces_to_slice() {
        let end = index().coerce(Some(json!(2))).await.unwrap();
        assert_eq!(end, json!({"start": null, "end": 2, "step": null}));
        let full = index().coerce(Some(json!([1, 5, 2]))).await.unwrap();
        assert_eq!(
            serde_json::from_value::<IndexSlice>(full).unwrap(),
            IndexSlice {
                start: Some(1),
                end: Some(5),
                step: Some(2)
            }
        );
        assert!(index().coerce(Some(json!([]))).await.is_err());
        assert!(index().coerce(Some(json!(["a"]))).await.is_err());
        assert!(index().coerce(Some(json!(1.5))).await.is_err());
    }

    #[test]
    fn slice_semantics() {
        let items = [0, 1, 2, 3, 4];
        let slice = |start, end, step| IndexSlice { start, end, step };

        assert_eq!(IndexSlice::until(2).apply(&items).unwrap(), vec![0, 1]);
        assert_eq!(slice(Some(-1), None, None).apply(&items).unwrap(), vec![4]);
        assert_eq!(slice(Some(1), Some(-1), None).apply(&items).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice(None, None, Some(2)).apply(&items).unwrap(), vec![0, 2, 4]);
        assert_eq!(slice(None, None, Some(-1)).apply(&items).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice(Some(3), Some(0), Some(-2)).apply(&items).unwrap(), vec![3, 1]);
        assert_eq!(slice(Some(10), None, None).apply(&items).unwrap(), Vec::<i32>::new());
        assert!(slice(None, None, Some(0)).apply(&items).is_err());
    }

    proptest! {
        #[test]
        fn slice_never_panics_and_stays_within_items(
            len in 0usize..20,
            start in proptest::option::of(-30i64..30),
            end in proptest::option::of(-30i64..30),
            step in proptest::option::of(prop_oneof![-5i64..0, 1i64..5]),
        ) {
            let items: Vec<usize> = (0..len).collect();
            let picked = IndexSlice { start, end, step }.apply(&items).unwrap();
            prop_assert!(picked.len() <= len);
            prop_assert!(picked.iter().all(|i| *i < len));
        }
    }
}
