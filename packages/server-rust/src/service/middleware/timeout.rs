//! Timeout middleware for dispatch requests.
//!
//! Rejects requests that exceed their `timeout_ms` with `ServiceError::Timeout`.

use std::task::{Context, Poll};
use std::time::Duration;

use ledgerbridge_core::{ServiceError, ServiceResult};
use tower::{Layer, Service};

use crate::service::request::DispatchRequest;
use crate::service::router::DispatchFuture;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that wraps services with per-request deadline enforcement.
///
/// The deadline is read from each request's `timeout_ms` field. Dropping the
/// inner future on expiry cancels the operation at its next suspension point.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<DispatchRequest> for TimeoutService<S>
where
    S: Service<DispatchRequest, Response = ServiceResult, Error = ServiceError> + Send,
    S::Future: Send + 'static,
{
    type Response = ServiceResult;
    type Error = ServiceError;
    type Future = DispatchFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: DispatchRequest) -> Self::Future {
        let timeout_ms = req.timeout_ms;
        let fut = self.inner.call(req);
        Box::pin(async move {
            match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ServiceError::Timeout { timeout_ms }),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use ledgerbridge_core::{ServiceParams, ServicePath};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    /// Service that takes a configurable delay before responding.
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<DispatchRequest> for SlowService {
        type Response = ServiceResult;
        type Error = ServiceError;
        type Future = DispatchFuture;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: DispatchRequest) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(ServiceResult::new(json!(delay), "number"))
            })
        }
    }

    fn make_req(timeout_ms: u64) -> DispatchRequest {
        DispatchRequest::invoke(
            1,
            ServicePath::parse("g.s.op"),
            ServiceParams::default(),
            timeout_ms,
        )
    }

    #[tokio::test]
    async fn completes_within_timeout() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 10 });
        let resp = svc.oneshot(make_req(1000)).await.unwrap();
        assert_eq!(resp.data, json!(10));
    }

    #[tokio::test]
    async fn exceeds_timeout_returns_error() {
        let svc = TimeoutLayer.layer(SlowService { delay_ms: 200 });
        let err = svc.oneshot(make_req(50)).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout { timeout_ms: 50 });
        assert_eq!(err.kind().as_str(), "Timeout");
    }
}
