//! Metrics middleware for dispatch requests.
//!
//! Each request runs inside a `dispatch` span that records its duration and
//! outcome. Outcomes are also tallied in a shared [`DispatchStats`] so the
//! owner of the pipeline can report totals without a metrics backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use ledgerbridge_core::{ErrorKind, ServiceError, ServiceResult};
use serde::Serialize;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::request::DispatchRequest;
use crate::service::router::DispatchFuture;

// ---------------------------------------------------------------------------
// DispatchStats
// ---------------------------------------------------------------------------

/// Outcome counters shared by every clone of a [`MetricsService`].
///
/// Failures are counted under their [`ErrorKind`]. Requests rejected
/// before reaching the pipeline, such as undecodable parameter documents,
/// are not seen here.
#[derive(Debug, Default)]
pub struct DispatchStats {
    ok: AtomicU64,
    failed: [AtomicU64; ErrorKind::ALL.len()],
    total_ms: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub ok: u64,
    pub failed: Vec<(ErrorKind, u64)>,
    pub total_ms: u64,
}

impl StatsSnapshot {
    #[must_use]
    pub fn requests(&self) -> u64 {
        self.ok + self.failed.iter().map(|(_, n)| n).sum::<u64>()
    }

    #[must_use]
    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.failed
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or(0, |(_, n)| *n)
    }
}

impl DispatchStats {
    fn record(&self, outcome: Result<(), ErrorKind>, duration_ms: u64) {
        match outcome {
            Ok(()) => self.ok.fetch_add(1, Ordering::Relaxed),
            Err(kind) => self.failed[kind.index()].fetch_add(1, Ordering::Relaxed),
        };
        self.total_ms.fetch_add(duration_ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ok: self.ok.load(Ordering::Relaxed),
            failed: ErrorKind::ALL
                .iter()
                .map(|kind| (*kind, self.failed[kind.index()].load(Ordering::Relaxed)))
                .filter(|(_, n)| *n > 0)
                .collect(),
            total_ms: self.total_ms.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments requests and feeds a [`DispatchStats`].
#[derive(Debug, Clone, Default)]
pub struct MetricsLayer {
    stats: Arc<DispatchStats>,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(stats: Arc<DispatchStats>) -> Self {
        Self { stats }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            stats: Arc::clone(&self.stats),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    stats: Arc<DispatchStats>,
}

impl<S> Service<DispatchRequest> for MetricsService<S>
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
        let span = info_span!(
            "dispatch",
            path = %req.path,
            call_id = req.call_id,
            action = req.action.as_str(),
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let stats = Arc::clone(&self.stats);
        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = result.as_ref().map(|_| ()).map_err(ServiceError::kind);
                stats.record(outcome, duration_ms);

                let label = outcome.map_or_else(ErrorKind::as_str, |()| "ok");
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", label);
                tracing::debug!(duration_ms, outcome = label, "dispatch complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
