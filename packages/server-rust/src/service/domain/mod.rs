//! Business services and the assembled service tree.

pub mod artifacts;

use std::sync::Arc;

pub use artifacts::ArtifactService;

use super::config::DispatchConfig;
use super::registry::ServiceNode;
use crate::storage::DataStoreRegistry;

/// Name of the top-level groups node.
pub const ROOT_NAME: &str = "ledgerbridge";

/// Group holding the data-handling services.
pub const DATA_GROUP: &str = "data";

/// Assembles the application tree. Stores are created in `registry`.
#[must_use]
pub fn build_service_tree(registry: &DataStoreRegistry, config: &DispatchConfig) -> ServiceNode {
    let artifacts = Arc::new(ArtifactService::new(registry, config.artifact_store));

    ServiceNode::groups(
        ROOT_NAME,
        vec![ServiceNode::group(DATA_GROUP, vec![artifacts.node()])
            .describe("Data handling services.")],
    )
    .describe("LedgerBridge service tree.")
}
