//! Request and response envelopes shared by every transport.
//!
//! A transport only has to produce a [`ServiceParams`] and render a
//! [`ServiceResult`]; nothing else about the dispatch core leaks out.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;

// ---------------------------------------------------------------------------
// ServiceResult
// ---------------------------------------------------------------------------

/// Uniform result shape returned by every pipeline boundary.
///
/// `kind` is serialized as `type`: either a declared type label or an
/// [`ErrorKind`](crate::ErrorKind) name. `errs` is present only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResult<R = Value> {
    pub data: R,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errs: Option<String>,
}

impl<R> ServiceResult<R> {
    /// Successful result with the given type label.
    pub fn new(data: R, kind: impl Into<String>) -> Self {
        Self {
            data,
            kind: kind.into(),
            errs: None,
        }
    }

    /// Whether this envelope reports a failure.
    #[must_use]
    pub fn is_err(&self) -> bool {
        self.errs.is_some()
    }
}

impl ServiceResult<Value> {
    /// Failed result: `data` is null, `type` is the error kind name.
    #[must_use]
    pub fn from_error(err: &ServiceError) -> Self {
        Self {
            data: Value::Null,
            kind: err.kind().as_str().to_string(),
            errs: Some(err.to_string()),
        }
    }

    /// Validates a loosely-typed document as an envelope.
    ///
    /// Requires an object with a `data` key, a string `type`, and `errs`
    /// either absent or a string. Extra keys are ignored.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let data = obj.get("data")?.clone();
        let kind = obj.get("type")?.as_str()?.to_string();
        let errs = match obj.get("errs") {
            None => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return None,
        };
        Some(Self { data, kind, errs })
    }

    /// Renders the envelope as a JSON document.
    #[must_use]
    pub fn into_value(self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("data".to_string(), self.data);
        obj.insert("type".to_string(), Value::String(self.kind));
        if let Some(errs) = self.errs {
            obj.insert("errs".to_string(), Value::String(errs));
        }
        Value::Object(obj)
    }
}

impl From<ServiceError> for ServiceResult<Value> {
    fn from(err: ServiceError) -> Self {
        Self::from_error(&err)
    }
}

// ---------------------------------------------------------------------------
// ServiceParams
// ---------------------------------------------------------------------------

/// Raw arguments for one invocation: positional values plus named values.
///
/// Named values keep their insertion order. The legacy key `parameters_kv` is
/// accepted as an alias for `parameterskv`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceParams {
    pub parameters: Vec<Value>,
    #[serde(default, alias = "parameters_kv", skip_serializing_if = "IndexMap::is_empty")]
    pub parameterskv: IndexMap<String, Value>,
}

impl ServiceParams {
    /// Positional-only parameters.
    #[must_use]
    pub fn positional(parameters: Vec<Value>) -> Self {
        Self {
            parameters,
            parameterskv: IndexMap::new(),
        }
    }

    /// Adds a named value, replacing any previous value for `name`.
    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameterskv.insert(name.into(), value);
        self
    }

    /// Decodes and validates a request document.
    ///
    /// An empty object stands for "no parameters". Otherwise `parameters`
    /// must be an array and `parameterskv`, when present, an object.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Param`] when the document has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, ServiceError> {
        let Value::Object(mut obj) = value else {
            return Err(ServiceError::param(
                "service parameters must be a JSON object",
            ));
        };

        if obj.is_empty() {
            return Ok(Self::default());
        }

        let parameters = match obj.remove("parameters") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ServiceError::param(
                    "service parameters require a 'parameters' array",
                ))
            }
        };

        let named = obj
            .remove("parameterskv")
            .or_else(|| obj.remove("parameters_kv"));
        let parameterskv = match named {
            None | Some(Value::Null) => IndexMap::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(_) => {
                return Err(ServiceError::param(
                    "'parameterskv' must be an object of named values",
                ))
            }
        };

        Ok(Self {
            parameters,
            parameterskv,
        })
    }

    /// Decodes a JSON request body. A blank body means "no parameters".
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Param`] on malformed JSON or a malformed shape.
    pub fn from_json_str(body: &str) -> Result<Self, ServiceError> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(body).map_err(|e| {
            ServiceError::param(format!("could not decode service parameters: {e}"))
        })?;
        Self::from_value(value)
    }
}
