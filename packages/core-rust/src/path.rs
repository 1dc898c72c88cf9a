//! Path addressing over service tree names.
//!
//! Routers address nodes with `/group/service/op`; scripts use the dotted
//! form `group.service.op`. Both parse to the same [`ServicePath`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordered sequence of node names from (but excluding) the tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServicePath(Vec<String>);

impl ServicePath {
    /// Builds a path from individual segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parses either the route form (`/a/b/c`) or the dotted form (`a.b.c`).
    ///
    /// A string containing `/` is split on `/` only, so operation names that
    /// contain dots survive the route form. Empty segments are dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let separator = if raw.contains('/') { '/' } else { '.' };
        Self(
            raw.split(separator)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Segments as borrowed names, ready for tree lookup.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Route form, e.g. `/clients/cegid/get`.
    #[must_use]
    pub fn to_route(&self) -> String {
        format!("/{}", self.0.join("/"))
    }

    /// Dotted form, e.g. `clients.cegid.get`.
    #[must_use]
    pub fn to_dotted(&self) -> String {
        self.0.join(".")
    }
}

impl fmt::Display for ServicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_route())
    }
}

impl FromStr for ServicePath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<Vec<String>> for ServicePath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}
