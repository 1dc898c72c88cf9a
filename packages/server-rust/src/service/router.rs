//! Path routing: dispatches a [`DispatchRequest`] to the addressed node of
//! the service tree.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ledgerbridge_core::{ServiceError, ServiceResult};
use tower::Service;

use super::registry::ServiceNode;
use super::request::{DispatchAction, DispatchRequest};

/// Envelope type label of a describe response.
pub const SERVICE_INFO_TYPE: &str = "ServiceInfo";

/// Boxed response future shared by every pipeline layer.
pub type DispatchFuture =
    Pin<Box<dyn Future<Output = Result<ServiceResult, ServiceError>> + Send>>;

// ---------------------------------------------------------------------------
// TreeRouter
// ---------------------------------------------------------------------------

/// Innermost pipeline service: resolves the request path below `root` and
/// describes or runs the node found there.
///
/// Unknown paths fail with [`ServiceError::NotFound`]; invoking a node
/// without payload fails with [`ServiceError::NotImplemented`].
#[derive(Debug, Clone)]
pub struct TreeRouter {
    root: Arc<ServiceNode>,
}

impl TreeRouter {
    #[must_use]
    pub fn new(root: Arc<ServiceNode>) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Arc<ServiceNode> {
        &self.root
    }

    fn resolve(&self, req: &DispatchRequest) -> Result<Arc<ServiceNode>, ServiceError> {
        if req.path.is_empty() {
            return Ok(self.root.clone());
        }
        self.root.lookup_path(&req.path).cloned()
    }
}

impl Service<DispatchRequest> for TreeRouter {
    type Response = ServiceResult;
    type Error = ServiceError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let node = match self.resolve(&req) {
            Ok(node) => node,
            Err(err) => return Box::pin(async move { Err(err) }),
        };

        match req.action {
            DispatchAction::Describe => {
                let info = node.info();
                Box::pin(async move { Ok(ServiceResult::new(info, SERVICE_INFO_TYPE)) })
            }
            DispatchAction::Invoke(params) => Box::pin(async move { node.exec(params).await }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
