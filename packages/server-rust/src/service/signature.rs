//! Declared call signatures and argument binding.
//!
//! Handlers receive their inputs as a bound [`Arguments`] map. The
//! [`Signature`] declared on an operation decides how validated positional
//! and named values are assigned to parameter names and which defaults fill
//! the gaps.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// How a declared parameter may be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Only by position.
    PositionalOnly,
    /// By position or by name.
    PositionalOrKeyword,
    /// Only by name.
    KeywordOnly,
}

/// One declared parameter of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureParam {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

/// Binding failures. `Missing` is reported with the parameter name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("missing a required argument: '{0}'")]
    Missing(String),
    #[error("too many positional arguments: expected at most {expected}, got {got}")]
    TooManyPositional { expected: usize, got: usize },
    #[error("got an unexpected keyword argument '{0}'")]
    UnexpectedKeyword(String),
    #[error("multiple values for argument '{0}'")]
    Duplicate(String),
    #[error("positional-only argument '{0}' passed as keyword")]
    PositionalAsKeyword(String),
}

/// Ordered parameter list of a handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<SignatureParam>,
    extra_keywords: bool,
}

impl Signature {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: impl Into<String>, kind: ParamKind, default: Option<Value>) -> Self {
        self.params.push(SignatureParam {
            name: name.into(),
            kind,
            default,
        });
        self
    }

    /// Required positional-only parameter.
    #[must_use]
    pub fn positional_only(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::PositionalOnly, None)
    }

    /// Required positional-or-keyword parameter.
    #[must_use]
    pub fn required(self, name: impl Into<String>) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, None)
    }

    /// Positional-or-keyword parameter with a default.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, default: Value) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, Some(default))
    }

    /// Keyword-only parameter; `None` makes it required.
    #[must_use]
    pub fn keyword(self, name: impl Into<String>, default: Option<Value>) -> Self {
        self.push(name, ParamKind::KeywordOnly, default)
    }

    /// Accept keyword values not declared above; they land in
    /// [`Arguments::extra`].
    #[must_use]
    pub fn with_extra_keywords(mut self) -> Self {
        self.extra_keywords = true;
        self
    }

    #[must_use]
    pub fn params(&self) -> &[SignatureParam] {
        &self.params
    }

    /// Assigns values to parameters and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] when the values do not fit the signature.
    pub fn bind(
        &self,
        positional: Vec<Value>,
        named: IndexMap<String, Value>,
    ) -> Result<Arguments, BindError> {
        let accepts_position: Vec<&SignatureParam> = self
            .params
            .iter()
            .filter(|p| p.kind != ParamKind::KeywordOnly)
            .collect();

        if positional.len() > accepts_position.len() {
            return Err(BindError::TooManyPositional {
                expected: accepts_position.len(),
                got: positional.len(),
            });
        }

        let mut bound: IndexMap<String, Value> = IndexMap::new();
        for (param, value) in accepts_position.iter().zip(positional) {
            bound.insert(param.name.clone(), value);
        }

        let mut extra = IndexMap::new();
        for (key, value) in named {
            match self.params.iter().find(|p| p.name == key) {
                Some(param) if param.kind == ParamKind::PositionalOnly => {
                    if !self.extra_keywords {
                        return Err(BindError::PositionalAsKeyword(key));
                    }
                    extra.insert(key, value);
                }
                Some(_) => {
                    if bound.contains_key(&key) {
                        return Err(BindError::Duplicate(key));
                    }
                    bound.insert(key, value);
                }
                None if self.extra_keywords => {
                    extra.insert(key, value);
                }
                None => return Err(BindError::UnexpectedKeyword(key)),
            }
        }

        let mut values = IndexMap::with_capacity(self.params.len());
        for param in &self.params {
            let value = match bound.swap_remove(&param.name) {
                Some(value) => value,
                None => match &param.default {
                    Some(default) => default.clone(),
                    None => return Err(BindError::Missing(param.name.clone())),
                },
            };
            values.insert(param.name.clone(), value);
        }

        Ok(Arguments { values, extra })
    }
}

/// Values bound to a handler's declared parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: IndexMap<String, Value>,
    extra: IndexMap<String, Value>,
}

impl Arguments {
    /// Raw bound value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Deserializes the bound value of `name`.
    ///
    /// # Errors
    ///
    /// Fails when `name` is unbound or has the wrong shape for `T`.
    pub fn value<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let raw = self
            .values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("argument '{name}' is not bound"))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| anyhow::anyhow!("argument '{name}' has an unexpected shape: {e}"))
    }

    /// Deserializes the value bound to the `index`-th declared parameter.
    ///
    /// # Errors
    ///
    /// Fails when there is no such parameter or the value has the wrong
    /// shape for `T`.
    pub fn nth<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let (name, raw) = self
            .values
            .get_index(index)
            .ok_or_else(|| anyhow::anyhow!("no argument at position {index}"))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| anyhow::anyhow!("argument '{name}' has an unexpected shape: {e}"))
    }

    /// Like [`value`](Self::value) but maps an unbound or null value to `None`.
    ///
    /// # Errors
    ///
    /// Fails when the value is present but has the wrong shape for `T`.
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.value(name).map(Some),
        }
    }

    /// Keyword values accepted by [`Signature::with_extra_keywords`].
    #[must_use]
    pub fn extra(&self) -> &IndexMap<String, Value> {
        &self.extra
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
