//! Runtime type names for raw JSON values.

use serde_json::Value;

/// Name of the runtime type of `value`, used as the `type` label of echoed
/// results.
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
