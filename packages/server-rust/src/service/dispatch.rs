//! Non-throwing outer boundary over the dispatch pipeline.
//!
//! Whatever happens below (unknown path, missing payload, parameter
//! rejection, handler failure or panic, expired deadline), callers of
//! [`Dispatcher`] receive a [`ServiceResult`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ledgerbridge_core::{ServiceParams, ServicePath, ServiceResult};
use parking_lot::Mutex;
use tower::ServiceExt;

use super::config::DispatchConfig;
use super::middleware::{build_dispatch_pipeline, DispatchPipeline, DispatchStats, StatsSnapshot};
use super::registry::ServiceNode;
use super::request::DispatchRequest;
use super::router::TreeRouter;

pub struct Dispatcher {
    root: Arc<ServiceNode>,
    pipeline: Mutex<DispatchPipeline>,
    stats: Arc<DispatchStats>,
    next_call_id: AtomicU64,
    default_timeout_ms: u64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(root: Arc<ServiceNode>, config: &DispatchConfig) -> Self {
        let stats = Arc::new(DispatchStats::default());
        let pipeline = build_dispatch_pipeline(TreeRouter::new(root.clone()), Arc::clone(&stats));
        Self {
            root,
            pipeline: Mutex::new(pipeline),
            stats,
            next_call_id: AtomicU64::new(1),
            default_timeout_ms: config.default_timeout_ms,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Arc<ServiceNode> {
        &self.root
    }

    /// Every addressable path below the root.
    #[must_use]
    pub fn routes(&self) -> Vec<ServicePath> {
        self.root.route_paths()
    }

    /// Pipeline outcome totals since construction.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Allocates a call id; ids are unique per dispatcher.
    pub fn next_call_id(&self) -> u64 {
        self.next_call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs a prepared request through the pipeline.
    pub async fn dispatch(&self, req: DispatchRequest) -> ServiceResult {
        let svc = self.pipeline.lock().clone();
        match svc.oneshot(req).await {
            Ok(result) => result,
            Err(err) => ServiceResult::from_error(&err),
        }
    }

    /// Invokes the node at `path` with the default deadline.
    pub async fn call(&self, path: &ServicePath, params: ServiceParams) -> ServiceResult {
        let req = DispatchRequest::invoke(
            self.next_call_id(),
            path.clone(),
            params,
            self.default_timeout_ms,
        );
        self.dispatch(req).await
    }

    /// Invokes the node at `path` with a raw JSON parameter document.
    ///
    /// A malformed document is reported as a `ParamError` envelope.
    pub async fn call_json(&self, path: &ServicePath, body: &str) -> ServiceResult {
        match ServiceParams::from_json_str(body) {
            Ok(params) => self.call(path, params).await,
            Err(err) => ServiceResult::from_error(&err),
        }
    }

    /// Nested description of the node at `path`, typed `ServiceInfo`.
    pub async fn describe(&self, path: &ServicePath) -> ServiceResult {
        let req = DispatchRequest::describe(
            self.next_call_id(),
            path.clone(),
            self.default_timeout_ms,
        );
        self.dispatch(req).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("root", &self.root.name())
            .field("default_timeout_ms", &self.default_timeout_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use ledgerbridge_core::ErrorKind;
    use serde_json::json;

    use super::*;
    use crate::service::descriptor::{sync_fn, ParamDescriptor};
    use crate::service::operation::{async_handler, handler, Operation};

    fn dispatcher(timeout_ms: u64) -> Dispatcher {
        let double = Operation::builder("double")
            .param(ParamDescriptor::new(
                "n",
                "number",
                sync_fn(|v| {
                    if v.is_i64() {
                        Ok(v)
                    } else {
                        anyhow::bail!("value must be an integer")
                    }
                }),
            ))
            .build(handler(|args| Ok(json!(args.value::<i64>("n")? * 2))));
        let stall = Operation::builder("stall").build(async_handler(|_| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(json!(null))
        }));
        let root = ServiceNode::groups(
            "groups",
            vec![ServiceNode::group(
                "math",
                vec![ServiceNode::service("ops", vec![double, stall])],
            )],
        );
        Dispatcher::new(
            Arc::new(root),
            &DispatchConfig {
                default_timeout_ms: timeout_ms,
                ..DispatchConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn call_returns_typed_envelope() {
        let d = dispatcher(1000);
        let result = d
            .call(
                &ServicePath::parse("math.ops.double"),
                ServiceParams::positional(vec![json!(21)]),
            )
            .await;
        assert_eq!(result, ServiceResult::new(json!(42), "number"));
    }

    #[tokio::test]
    async fn every_failure_becomes_an_envelope() {
        let d = dispatcher(50);
        let cases = [
            ("math.ops.nope", "", "NotFound"),
            ("math.ops", "", "NotImplemented"),
            ("math.ops.double", r#"{"parameters": ["x"]}"#, "ParamError"),
            ("math.ops.double", r#"{"parameters": 3}"#, "ParamError"),
            ("math.ops.double", r#"{"parameters": []}"#, "ParamError"),
            ("math.ops.double", "not json", "ParamError"),
            ("math.ops.stall", "", "Timeout"),
        ];
        for (path, body, kind) in cases {
            let result = d.call_json(&ServicePath::parse(path), body).await;
            assert_eq!(result.kind, kind, "{path} {body}");
            assert!(result.errs.is_some());
            assert_eq!(result.data, serde_json::Value::Null);
        }

        let stats = d.stats();
        assert_eq!(stats.ok, 0);
        assert_eq!(stats.requests(), 6);
        assert_eq!(stats.failures(ErrorKind::ParamError), 3);
        assert_eq!(stats.failures(ErrorKind::Timeout), 1);
    }

    #[tokio::test]
    async fn describe_is_service_info() {
        let d = dispatcher(1000);
        let result = d.describe(&ServicePath::parse("/math")).await;
        assert_eq!(result.kind, "ServiceInfo");
        assert_eq!(result.data["services"][0]["name"], json!("ops"));
        assert!(result.errs.is_none());
    }

    #[tokio::test]
    async fn call_ids_are_unique() {
        let d = dispatcher(1000);
        let ids: HashSet<u64> = (0..100).map(|_| d.next_call_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn routes_list_every_node() {
        let routes: Vec<String> = dispatcher(1000)
            .routes()
            .iter()
            .map(ServicePath::to_route)
            .collect();
        assert_eq!(routes, vec!["/math", "/math/ops", "/math/ops/double", "/math/ops/stall"]);
    }
}
