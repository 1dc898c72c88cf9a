//! `LedgerBridge` Core: service envelopes, error taxonomy, and path addressing.

pub mod envelope;
pub mod error;
pub mod path;
pub mod value;

pub use envelope::{ServiceParams, ServiceResult};
pub use error::{ErrorKind, ServiceError, ServiceOutcome};
pub use path::ServicePath;
pub use value::type_name;
