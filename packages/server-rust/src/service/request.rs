//! Requests travelling through the dispatch pipeline.

use ledgerbridge_core::{ServiceParams, ServicePath};

/// What to do with the addressed node.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    /// Return the node's nested description.
    Describe,
    /// Run the node with the given parameters.
    Invoke(ServiceParams),
}

impl DispatchAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Invoke(_) => "invoke",
        }
    }
}

/// One call addressed to a node of the service tree.
///
/// An empty `path` addresses the root node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub call_id: u64,
    pub path: ServicePath,
    pub timeout_ms: u64,
    pub action: DispatchAction,
}

impl DispatchRequest {
    #[must_use]
    pub fn invoke(call_id: u64, path: ServicePath, params: ServiceParams, timeout_ms: u64) -> Self {
        Self {
            call_id,
            path,
            timeout_ms,
            action: DispatchAction::Invoke(params),
        }
    }

    #[must_use]
    pub fn describe(call_id: u64, path: ServicePath, timeout_ms: u64) -> Self {
        Self {
            call_id,
            path,
            timeout_ms,
            action: DispatchAction::Describe,
        }
    }
}
