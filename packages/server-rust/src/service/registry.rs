//! Service tree: operations grouped into services, services into groups,
//! groups into a top-level groups node.
//!
//! A [`ServiceNode`] holds its metadata next to an ordered map of child
//! attributes; each attribute is a single child or a list of children. The
//! tree is assembled once at startup and never mutated afterwards, so it is
//! shared as `Arc<ServiceNode>`.

use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use ledgerbridge_core::{ServiceError, ServiceParams, ServicePath, ServiceResult};
use serde_json::{json, Map, Value};

use super::operation::Operation;

/// Child attribute keys used by the standard constructors.
pub mod child_keys {
    pub const OPERATIONS: &str = "operations";
    pub const SERVICES: &str = "services";
    pub const GROUPS: &str = "groups";
}

// ---------------------------------------------------------------------------
// Child
// ---------------------------------------------------------------------------

/// Value of one child attribute.
#[derive(Debug, Clone)]
pub enum Child {
    One(Arc<ServiceNode>),
    Many(Vec<Arc<ServiceNode>>),
}

impl Child {
    fn nodes(&self) -> &[Arc<ServiceNode>] {
        match self {
            Self::One(node) => std::slice::from_ref(node),
            Self::Many(nodes) => nodes,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeAttr
// ---------------------------------------------------------------------------

/// Attribute projected by [`ServiceNode::paths_attr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeAttr {
    Name,
    Type,
    Description,
}

impl FromStr for NodeAttr {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "type" => Ok(Self::Type),
            "desc" | "description" => Ok(Self::Description),
            other => Err(ServiceError::not_found(format!(
                "service node has no attribute '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceNode
// ---------------------------------------------------------------------------

/// One element of the service tree.
///
/// Names are unique among siblings only; a node is addressed by the sequence
/// of names from the root.
#[derive(Debug, Default)]
pub struct ServiceNode {
    name: String,
    type_label: String,
    description: String,
    payload: Option<Arc<Operation>>,
    children: IndexMap<String, Child>,
}

impl ServiceNode {
    /// Bare node without payload or children.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Leaf node running `op`.
    #[must_use]
    pub fn operation(op: Operation) -> Self {
        Self {
            name: op.name().to_string(),
            type_label: op.meta().type_label.clone(),
            description: op.meta().description.clone(),
            payload: Some(Arc::new(op)),
            children: IndexMap::new(),
        }
    }

    /// Groups operations under `operations`.
    pub fn service(name: impl Into<String>, operations: Vec<Operation>) -> Self {
        Self::new(name).with_children(
            child_keys::OPERATIONS,
            operations.into_iter().map(Self::operation).collect(),
        )
    }

    /// Groups services under `services`.
    pub fn group(name: impl Into<String>, services: Vec<ServiceNode>) -> Self {
        Self::new(name).with_children(child_keys::SERVICES, services)
    }

    /// Top-level node grouping groups under `groups`.
    pub fn groups(name: impl Into<String>, groups: Vec<ServiceNode>) -> Self {
        Self::new(name).with_children(child_keys::GROUPS, groups)
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn type_label(mut self, type_label: impl Into<String>) -> Self {
        self.type_label = type_label.into();
        self
    }

    /// Sets a single child under `key`.
    #[must_use]
    pub fn with_child(mut self, key: impl Into<String>, child: ServiceNode) -> Self {
        self.children.insert(key.into(), Child::One(Arc::new(child)));
        self
    }

    /// Sets an ordered list of children under `key`.
    #[must_use]
    pub fn with_children(mut self, key: impl Into<String>, children: Vec<ServiceNode>) -> Self {
        self.children.insert(
            key.into(),
            Child::Many(children.into_iter().map(Arc::new).collect()),
        );
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_label
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Arc<Operation>> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn children(&self) -> &IndexMap<String, Child> {
        &self.children
    }

    /// Direct children in attribute order, lists flattened.
    pub fn child_nodes(&self) -> impl Iterator<Item = &Arc<ServiceNode>> {
        self.children.values().flat_map(Child::nodes)
    }

    fn attr(&self, attr: NodeAttr) -> &str {
        match attr {
            NodeAttr::Name => &self.name,
            NodeAttr::Type => &self.type_label,
            NodeAttr::Description => &self.description,
        }
    }

    // --- Lookup ---

    /// Walks `names` one depth at a time, matching direct children.
    ///
    /// Returns `None` if any step has no match or `names` is empty.
    #[must_use]
    pub fn get(&self, names: &[&str]) -> Option<&Arc<ServiceNode>> {
        let (first, rest) = names.split_first()?;
        let child = self.child_nodes().find(|node| node.name == *first)?;
        if rest.is_empty() {
            Some(child)
        } else {
            child.get(rest)
        }
    }

    /// Containment test over a name path.
    #[must_use]
    pub fn has(&self, names: &[&str]) -> bool {
        self.get(names).is_some()
    }

    /// Indexed access over a name path.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] when no node sits at that path.
    pub fn lookup(&self, names: &[&str]) -> Result<&Arc<ServiceNode>, ServiceError> {
        self.get(names).ok_or_else(|| {
            ServiceError::not_found(format!(
                "no service node found at path '{}'",
                names.join(".")
            ))
        })
    }

    /// Indexed access with a parsed path.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] when no node sits at that path.
    pub fn lookup_path(&self, path: &ServicePath) -> Result<&Arc<ServiceNode>, ServiceError> {
        self.lookup(&path.segments())
    }

    // --- Introspection ---

    /// Every root-to-node path, starting with the root alone.
    #[must_use]
    pub fn paths(&self) -> Vec<Vec<&ServiceNode>> {
        fn collect<'a>(
            node: &'a ServiceNode,
            prefix: &[&'a ServiceNode],
            out: &mut Vec<Vec<&'a ServiceNode>>,
        ) {
            let mut path = prefix.to_vec();
            path.push(node);
            out.push(path.clone());
            for child in node.child_nodes() {
                collect(child, &path, out);
            }
        }

        let mut out = Vec::new();
        collect(self, &[], &mut out);
        out
    }

    /// [`paths`](Self::paths) projected onto one attribute.
    #[must_use]
    pub fn paths_attr(&self, attr: NodeAttr) -> Vec<Vec<String>> {
        self.paths()
            .into_iter()
            .map(|path| path.into_iter().map(|n| n.attr(attr).to_string()).collect())
            .collect()
    }

    /// Name paths relative to this node (root stripped), one per descendant.
    #[must_use]
    pub fn route_paths(&self) -> Vec<ServicePath> {
        self.paths_attr(NodeAttr::Name)
            .into_iter()
            .filter(|names| names.len() > 1)
            .map(|mut names| {
                names.remove(0);
                ServicePath::from(names)
            })
            .collect()
    }

    /// `{name, type?, desc?}`; empty labels are omitted.
    #[must_use]
    pub fn to_dict(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("name".to_string(), json!(self.name));
        if !self.type_label.is_empty() {
            obj.insert("type".to_string(), json!(self.type_label));
        }
        if !self.description.is_empty() {
            obj.insert("desc".to_string(), json!(self.description));
        }
        Value::Object(obj)
    }

    /// Nested description of the whole subtree.
    #[must_use]
    pub fn info(&self) -> Value {
        let mut obj = match &self.payload {
            Some(op) => match op.info() {
                Value::Object(obj) => obj,
                _ => Map::new(),
            },
            None => Map::new(),
        };
        for (key, value) in self.to_dict().as_object().into_iter().flatten() {
            obj.insert(key.clone(), value.clone());
        }
        for (key, child) in &self.children {
            let described = match child {
                Child::One(node) => node.info(),
                Child::Many(nodes) => Value::Array(nodes.iter().map(|n| n.info()).collect()),
            };
            obj.insert(key.clone(), described);
        }
        Value::Object(obj)
    }

    // --- Execution ---

    /// Runs the payload, reporting failures as errors.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotImplemented`] for nodes without payload, otherwise
    /// whatever the operation pipeline reports.
    pub async fn exec(&self, params: ServiceParams) -> Result<ServiceResult, ServiceError> {
        match &self.payload {
            Some(op) => op.invoke(params).await,
            None => Err(ServiceError::not_implemented(format!(
                "service node '{}' has no implemented function",
                self.name
            ))),
        }
    }

    /// Non-throwing boundary: always yields an envelope.
    pub async fn run(&self, params: ServiceParams) -> ServiceResult {
        match self.exec(params).await {
            Ok(result) => result,
            Err(err) => ServiceResult::from_error(&err),
        }
    }

    /// Resolves `path` below this node and runs it; lookup failures are
    /// reported in the envelope as well.
    pub async fn run_path(&self, path: &ServicePath, params: ServiceParams) -> ServiceResult {
        match self.lookup_path(path) {
            Ok(node) => node.run(params).await,
            Err(err) => ServiceResult::from_error(&err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::service::descriptor::{sync_fn, ParamDescriptor};
    use crate::service::operation::handler;

    fn op(name: &str) -> Operation {
        let name = name.to_string();
        let echo_name = name.clone();
        Operation::builder(name)
            .describe("Returns its own name.")
            .build(handler(move |_| Ok(json!(echo_name.clone()))))
    }

    fn tree() -> ServiceNode {
        ServiceNode::groups(
            "root",
            vec![
                ServiceNode::group(
                    "g",
                    vec![
                        ServiceNode::service("s", vec![op("op"), op("other")]),
                        ServiceNode::service("t", vec![op("op")]),
                    ],
                )
                .describe("Group g."),
                ServiceNode::group("h", vec![ServiceNode::service("s", vec![op("x")])]),
            ],
        )
    }

    #[test]
    fn lookup_walks_successive_depths() {
        let root = tree();
        assert_eq!(root.lookup(&["g", "s", "op"]).unwrap().name(), "op");
        assert_eq!(root.lookup(&["h", "s", "x"]).unwrap().name(), "x");
        assert!(root.has(&["g"]));
        assert!(root.has(&["g", "t"]));
        assert!(!root.has(&["s"]));
        assert!(!root.has(&["g", "s", "x"]));
        assert!(!root.has(&["g", "s", "op", "deeper"]));
    }

    #[test]
    fn empty_path_is_absent() {
        let root = tree();
        assert!(root.get(&[]).is_none());
        assert!(!root.has(&[]));
    }

    #[test]
    fn lookup_failure_is_not_found() {
        let err = tree().lookup(&["g", "nope"]).unwrap_err();
        assert_eq!(err.kind(), ledgerbridge_core::ErrorKind::NotFound);
        assert_eq!(err.to_string(), "no service node found at path 'g.nope'");
    }

    #[test]
    fn leaf_does_not_match_its_own_name() {
        let leaf = ServiceNode::operation(op("op"));
        assert!(leaf.get(&["op"]).is_none());
    }

    #[test]
    fn single_child_attribute_is_walked() {
        let root = ServiceNode::new("root")
            .with_child("main", ServiceNode::service("svc", vec![op("a")]));
        assert!(root.has(&["svc", "a"]));
        assert_eq!(root.info()["main"]["name"], json!("svc"));
    }

    #[test]
    fn paths_include_every_node_in_preorder() {
        let root = tree();
        let names = root.paths_attr(NodeAttr::Name);
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], vec!["root"]);
        assert_eq!(names[1], vec!["root", "g"]);
        assert_eq!(names[2], vec!["root", "g", "s"]);
        assert_eq!(names[3], vec!["root", "g", "s", "op"]);
        assert!(names.contains(&vec![
            "root".to_string(),
            "h".to_string(),
            "s".to_string(),
            "x".to_string()
        ]));
    }

    #[test]
    fn paths_project_other_attributes() {
        let root = tree();
        let descs = root.paths_attr("desc".parse().unwrap());
        assert_eq!(descs[1], vec!["", "Group g."]);
        assert!("colour".parse::<NodeAttr>().is_err());
        assert_eq!(root.paths().len(), root.paths_attr(NodeAttr::Type).len());
    }

    #[test]
    fn scenario_groups_tree_routes_and_info() {
        let root = ServiceNode::groups(
            "groups",
            vec![ServiceNode::group("g", vec![ServiceNode::service("s", vec![op("op")])])],
        );

        let routes: Vec<String> = root.route_paths().iter().map(ServicePath::to_dotted).collect();
        assert_eq!(routes, vec!["g", "g.s", "g.s.op"]);
        assert!(root
            .paths_attr(NodeAttr::Name)
            .contains(&vec!["groups".into(), "g".into(), "s".into(), "op".into()]));

        let info = root.info();
        assert_eq!(info["name"], json!("groups"));
        assert_eq!(info["groups"][0]["name"], json!("g"));
        assert_eq!(info["groups"][0]["services"][0]["name"], json!("s"));
        assert_eq!(
            info["groups"][0]["services"][0]["operations"][0]["name"],
            json!("op")
        );
        assert_eq!(
            info["groups"][0]["services"][0]["operations"][0]["return"]["name"],
            json!("return")
        );
    }

    #[test]
    fn to_dict_omits_empty_labels() {
        let node = ServiceNode::new("svc").type_label("Service");
        assert_eq!(node.to_dict(), json!({"name": "svc", "type": "Service"}));
    }

    #[tokio::test]
    async fn internal_node_is_not_implemented() {
        let root = tree();
        let group = root.lookup(&["g"]).unwrap();
        let result = group.run(ServiceParams::default()).await;
        assert_eq!(result.kind, "NotImplemented");
        assert_eq!(
            result.errs.as_deref(),
            Some("service node 'g' has no implemented function")
        );
    }

    #[tokio::test]
    async fn leaf_runs_its_operation() {
        let root = tree();
        let result = root
            .run_path(&ServicePath::parse("g.t.op"), ServiceParams::default())
            .await;
        assert_eq!(result, ServiceResult::new(json!("op"), "string"));

        let result = root
            .run_path(&ServicePath::parse("/g/missing"), ServiceParams::default())
            .await;
        assert_eq!(result.kind, "NotFound");
    }

    #[tokio::test]
    async fn missing_required_positional_through_tree() {
        let strict = Operation::builder("get")
            .param(ParamDescriptor::new("dataid", "string", sync_fn(Ok)))
            .build(handler(|args| args.value::<Value>("dataid")));
        let root = ServiceNode::groups(
            "groups",
            vec![ServiceNode::group("g", vec![ServiceNode::service("s", vec![strict])])],
        );

        let params = ServiceParams::from_value(json!({"parameters": []})).unwrap();
        let result = root.run_path(&ServicePath::parse("g.s.get"), params).await;
        assert_eq!(result.data, Value::Null);
        assert_eq!(result.kind, "ParamError");
        assert!(result.errs.unwrap().contains("dataid"));
    }

    proptest! {
        #[test]
        fn get_and_lookup_agree(
            names in proptest::collection::vec(
                prop_oneof![
                    Just("g"),
                    Just("h"),
                    Just("s"),
                    Just("t"),
                    Just("op"),
                    Just("x"),
                    Just("zz"),
                ],
                0..5,
            )
        ) {
            let root = tree();
            let found = root.get(&names).is_some();
            prop_assert_eq!(found, root.has(&names));
            prop_assert_eq!(found, root.lookup(&names).is_ok());
            if let Ok(node) = root.lookup(&names) {
                prop_assert_eq!(node.name(), *names.last().unwrap());
            }
        }
    }
}
