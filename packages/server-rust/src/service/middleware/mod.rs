//! Tower middleware layers for the dispatch pipeline.
//!
//! - [`timeout`]: Per-request deadline enforcement
//! - [`metrics`]: Request timing via `tracing` spans and outcome counters
//! - [`pipeline`]: Composes the layers around the tree router

pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use metrics::{DispatchStats, MetricsLayer, StatsSnapshot};
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
pub use timeout::TimeoutLayer;
