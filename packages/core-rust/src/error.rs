//! Error taxonomy for the dispatch pipeline.
//!
//! Failures travel through the pipeline as [`ServiceError`] values and are
//! converted to their stable [`ErrorKind`] name only when an envelope is
//! built (see [`ServiceResult::from_error`](crate::ServiceResult::from_error)).

use serde::{Deserialize, Serialize};

/// Stable discriminator for every failure the dispatch core can report.
///
/// The string form (`as_str`) is the `type` field of a failed envelope and is
/// part of the transport contract: do not rename variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A descriptor rejected its input, a return descriptor produced a
    /// malformed envelope, or arguments could not be bound.
    ParamError,
    /// A service tree path lookup failed.
    NotFound,
    /// A service tree node has no payload to run.
    NotImplemented,
    /// The target function failed with anything not covered above.
    ExecutionError,
    /// A `DataStore` count or size budget was exceeded.
    CapacityError,
    /// The dispatch deadline elapsed before the operation completed.
    Timeout,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 6] = [
        Self::ParamError,
        Self::NotFound,
        Self::NotImplemented,
        Self::ExecutionError,
        Self::CapacityError,
        Self::Timeout,
    ];

    /// Position of this kind in [`ALL`](Self::ALL).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParamError => "ParamError",
            Self::NotFound => "NotFound",
            Self::NotImplemented => "NotImplemented",
            Self::ExecutionError => "ExecutionError",
            Self::CapacityError => "CapacityError",
            Self::Timeout => "Timeout",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised inside the dispatch pipeline.
///
/// Every variant carries a human-readable message; the variant itself selects
/// the [`ErrorKind`] reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Param(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    NotImplemented(String),
    #[error("{0}")]
    Execution(String),
    #[error("{0}")]
    Capacity(String),
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ServiceError {
    /// Returns the kind used as the envelope discriminator.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Param(_) => ErrorKind::ParamError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Execution(_) => ErrorKind::ExecutionError,
            Self::Capacity(_) => ErrorKind::CapacityError,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Convenience constructor for parameter errors.
    pub fn param(msg: impl Into<String>) -> Self {
        Self::Param(msg.into())
    }

    /// Convenience constructor for lookup failures.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Convenience constructor for nodes without a payload.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    /// Convenience constructor for target function failures.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Convenience constructor for cache budget failures.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }
}

/// Convenience result type for pipeline stages.
pub type ServiceOutcome<T> = Result<T, ServiceError>;
