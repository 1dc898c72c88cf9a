//! Pipeline composition: combines the middleware layers into a single service stack.

use ledgerbridge_core::{ServiceError, ServiceResult};
use std::sync::Arc;

use tower::util::BoxCloneService;
use tower::ServiceBuilder;

use super::metrics::{DispatchStats, MetricsLayer};
use super::timeout::TimeoutLayer;
use crate::service::request::DispatchRequest;
use crate::service::router::TreeRouter;

/// Type-erased, cloneable dispatch stack.
pub type DispatchPipeline = BoxCloneService<DispatchRequest, ServiceResult, ServiceError>;

/// Build the dispatch pipeline by wrapping the `TreeRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- record timing and outcome into `stats`, timeouts included
/// 2. `TimeoutLayer` -- enforce the per-request deadline
#[must_use]
pub fn build_dispatch_pipeline(router: TreeRouter, stats: Arc<DispatchStats>) -> DispatchPipeline {
    BoxCloneService::new(
        ServiceBuilder::new()
            .layer(MetricsLayer::new(stats))
            .layer(TimeoutLayer)
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
