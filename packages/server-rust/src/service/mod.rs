//! Service tree, operation pipeline and dispatch.
//!
//! 1. **Descriptors** (`descriptor`, `signature`): validate inputs, shape outputs
//! 2. **Operations** (`operation`): the per-call pipeline around a handler
//! 3. **Tree** (`registry`): operations grouped into services and groups
//! 4. **Middleware** (`middleware`): Tower layers (timeout, metrics)
//! 5. **Routing** (`router`, `dispatch`): path lookup and the non-throwing boundary
//! 6. **Domain services** (`domain`, `common`): business modules and shared descriptors

pub mod common;
pub mod config;
pub mod descriptor;
pub mod dispatch;
pub mod domain;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod request;
pub mod router;
pub mod signature;

// Re-export key types for convenient access.
pub use config::DispatchConfig;
pub use descriptor::{
    async_fn, sync_fn, BoxFuture, DescriptorMeta, ParamDescriptor, ReturnDescriptor, ValueFn,
};
pub use dispatch::Dispatcher;
pub use domain::build_service_tree;
pub use operation::{async_handler, handler, typed, HandlerFn, Operation, OperationBuilder};
pub use registry::{Child, NodeAttr, ServiceNode};
pub use request::{DispatchAction, DispatchRequest};
pub use router::{TreeRouter, SERVICE_INFO_TYPE};
pub use signature::{Arguments, BindError, ParamKind, Signature};
