//! Common return descriptors.
//!
//! Each one shapes the raw operation output into a typed envelope with a
//! fixed type label.

use anyhow::bail;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::service::descriptor::{sync_fn, ReturnDescriptor};
use crate::service::operation::typed;

/// Echo return, typed by the runtime type of the output.
#[must_use]
pub fn default() -> ReturnDescriptor {
    ReturnDescriptor::echo().renamed("default")
}

/// Discards the output.
#[must_use]
pub fn none() -> ReturnDescriptor {
    ReturnDescriptor::new("none", "None", sync_fn(|_| Ok(typed(Value::Null, "None"))))
        .describe("Returns no value.")
}

fn uuid_string(value: &Value) -> anyhow::Result<Value> {
    match value.as_str().map(Uuid::parse_str) {
        Some(Ok(id)) => Ok(json!(id.to_string())),
        _ => bail!("value must be a UUID, got {value}"),
    }
}

#[must_use]
pub fn uuid() -> ReturnDescriptor {
    ReturnDescriptor::new(
        "uuid",
        "string[UUID]",
        sync_fn(|value| Ok(typed(uuid_string(&value)?, "string[UUID]"))),
    )
    .describe("Returns a UUID string.")
}

#[must_use]
pub fn uuids() -> ReturnDescriptor {
    ReturnDescriptor::new(
        "uuids",
        "[string[UUID], ...]",
        sync_fn(|value| {
            let Value::Array(items) = value else {
                bail!("value must be a list of UUIDs");
            };
            let ids = items.iter().map(uuid_string).collect::<anyhow::Result<Vec<_>>>()?;
            Ok(typed(Value::Array(ids), "[string[UUID], ...]"))
        }),
    )
    .describe("Returns a list of UUID strings.")
}

/// Status of the operation rendered as a string.
///
/// Numbers and strings are rendered as-is, a `[code, message]` pair as
/// `code: N | message: 'M'`; anything else becomes `"0"` when truthy and
/// `"1"` otherwise.
#[must_use]
pub fn exitstatus() -> ReturnDescriptor {
    ReturnDescriptor::new(
        "exitstatus",
        "string[ExitStatus]",
        sync_fn(|value| Ok(typed(json!(render_status(&value)), "string[ExitStatus]"))),
    )
    .describe("Returns the exit status of the operation.")
}

fn render_status(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(pair) if pair.len() == 2 => {
            let message = match &pair[1] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("code: {} | message: '{message}'", pair[0])
        }
        other => {
            let truthy = match other {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Array(items) => !items.is_empty(),
                Value::Object(obj) => !obj.is_empty(),
                Value::Number(_) | Value::String(_) => true,
            };
            let status = if truthy { "0" } else { "1" };
            status.to_string()
        }
    }
}

#[must_use]
pub fn fields() -> ReturnDescriptor {
    ReturnDescriptor::new(
        "fields",
        "string[]",
        sync_fn(|value| match &value {
            Value::Array(items) if items.iter().all(Value::is_string) => {
                Ok(typed(value, "string[]"))
            }
            _ => bail!("value must be a list of strings"),
        }),
    )
    .describe("Returns a list of field names.")
}
