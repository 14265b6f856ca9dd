use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use agentdag_core::error::{DagError, Result};
use agentdag_core::types::Params;

use crate::sequencer;

/// A node as written in the graph source.
///
/// `kind` selects the work unit (defaults to the node id); `children` lists the
/// nodes whose results this one consumes; every other key is a free-form
/// parameter handed verbatim to the work unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(flatten)]
    pub params: Params,
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the work-unit kind.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the child dependencies.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Add one parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Serialized form of a whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roots: Vec<String>,
    pub agents: BTreeMap<String, NodeSpec>,
}

/// Raw document shape; agents are kept as ordered entries so duplicate ids
/// reach validation instead of silently overwriting each other.
#[derive(Deserialize)]
struct RawGraph {
    #[serde(default)]
    roots: Vec<String>,
    #[serde(default, deserialize_with = "ordered_entries")]
    agents: Vec<(String, NodeSpec)>,
}

fn ordered_entries<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, NodeSpec)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Vec<(String, NodeSpec)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a mapping of node id to node definition")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, spec)) = map.next_entry::<String, Option<NodeSpec>>()? {
                entries.push((id, spec.unwrap_or_default()));
            }
            Ok(entries)
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }
    }

    deserializer.deserialize_any(EntriesVisitor)
}

/// A validated node.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub kind: Option<String>,
    pub children: Vec<String>,
    pub params: Arc<Params>,
}

impl Node {
    /// The work-unit kind; the node id when none is declared.
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(&self.id)
    }
}

/// Immutable, validated dependency graph.
///
/// Built once, then shared read-only (`Arc<Graph>`) by every node task.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
    declared_roots: Vec<String>,
    /// Reverse edges: node id -> nodes that list it as a child.
    parents: HashMap<String, Vec<String>>,
}

impl Graph {
    /// Load and validate a YAML graph file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| DagError::ConfigNotFound(path.display().to_string()))?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a YAML graph document.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let raw: RawGraph =
            serde_yaml::from_str(content).map_err(|e| DagError::GraphParse(e.to_string()))?;
        Self::from_nodes(raw.roots, raw.agents)
    }

    /// Build and validate a graph from `(id, spec)` pairs.
    pub fn from_nodes<I>(roots: Vec<String>, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, NodeSpec)>,
    {
        let mut nodes = BTreeMap::new();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();

        for (id, spec) in entries {
            if nodes.contains_key(&id) {
                return Err(DagError::DuplicateNode(id));
            }
            for child in &spec.children {
                parents.entry(child.clone()).or_default().push(id.clone());
            }
            nodes.insert(
                id.clone(),
                Node {
                    id,
                    kind: spec.kind,
                    children: spec.children,
                    params: Arc::new(spec.params),
                },
            );
        }

        for list in parents.values_mut() {
            list.sort();
            list.dedup();
        }

        let graph = Self {
            nodes,
            declared_roots: roots,
            parents,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Check references, roots, and acyclicity.
    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(DagError::GraphParse("graph defines no agents".to_string()));
        }

        for node in self.nodes.values() {
            let mut seen = HashSet::new();
            for child in &node.children {
                if !seen.insert(child.as_str()) {
                    return Err(DagError::DuplicateChild {
                        node: node.id.clone(),
                        child: child.clone(),
                    });
                }
                if *child == node.id {
                    return Err(DagError::SelfDependency(node.id.clone()));
                }
                if !self.nodes.contains_key(child) {
                    return Err(DagError::DependencyNotFound {
                        node: node.id.clone(),
                        missing: child.clone(),
                    });
                }
            }
        }

        for root in &self.declared_roots {
            if !self.nodes.contains_key(root) {
                return Err(DagError::UnknownRoot(root.clone()));
            }
        }

        sequencer::sort(self).map(|_| ())
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Declared children of a node (empty for unknown ids).
    pub fn children(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Nodes that list `id` as a child.
    pub fn parents(&self, id: &str) -> &[String] {
        self.parents.get(id).map(|p| p.as_slice()).unwrap_or(&[])
    }

    /// Every node that transitively depends on `id`.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if seen.insert(parent.clone()) {
                    queue.push_back(parent);
                }
            }
        }
        seen
    }

    /// Roots the caller awaits: the declared ones, or else every node no
    /// other node depends on.
    pub fn roots(&self) -> Vec<String> {
        if !self.declared_roots.is_empty() {
            return self.declared_roots.clone();
        }
        self.nodes
            .keys()
            .filter(|id| self.parents(id).is_empty())
            .cloned()
            .collect()
    }

    pub fn declared_roots(&self) -> &[String] {
        &self.declared_roots
    }

    /// Convert back to the serializable form.
    pub fn to_spec(&self) -> GraphSpec {
        GraphSpec {
            roots: self.declared_roots.clone(),
            agents: self
                .nodes
                .values()
                .map(|n| {
                    (
                        n.id.clone(),
                        NodeSpec {
                            kind: n.kind.clone(),
                            children: n.children.clone(),
                            params: (*n.params).clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Serialize the graph as YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(&self.to_spec()).map_err(|e| DagError::GraphParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEATHER_GRAPH: &str = r#"
agents:
  weatherForecast:
    queryParameters:
      lat: 52.52
      lon: 13.405
      lang: en
      units: metric
  nearBySearch:
    payload:
      location: {lat: 52.52, lng: 13.405}
      radius: 1500
      type: restaurant
  openAICall:
    children: [weatherForecast, nearBySearch]
    model: gpt-4o
    messages:
      - role: user
        content: "Weather: {{.weatherForecast}} Places: {{.nearBySearch}}"
"#;

    fn spec(children: &[&str]) -> NodeSpec {
        NodeSpec::new().with_children(children.iter().copied())
    }

    #[test]
    fn test_load_from_yaml() {
        let graph = Graph::from_yaml_str(WEATHER_GRAPH).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(
            graph.children("openAICall"),
            &["weatherForecast".to_string(), "nearBySearch".to_string()]
        );
        let node = graph.node("openAICall").unwrap();
        assert_eq!(node.kind(), "openAICall");
        assert_eq!(node.params["model"], serde_json::json!("gpt-4o"));
        assert_eq!(graph.roots(), vec!["openAICall".to_string()]);
    }

    #[test]
    fn test_explicit_kind() {
        let yaml = r#"
agents:
  greeting:
    kind: static
    output: hello
"#;
        let graph = Graph::from_yaml_str(yaml).unwrap();
        let node = graph.node("greeting").unwrap();
        assert_eq!(node.kind(), "static");
        assert_eq!(node.params["output"], serde_json::json!("hello"));
        assert!(!node.params.contains_key("kind"));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = Graph::from_yaml_str("agents: [unclosed").unwrap_err();
        assert!(matches!(err, DagError::GraphParse(_)));
    }

    #[test]
    fn test_empty_graph_rejected() {
        let err = Graph::from_yaml_str("agents: {}").unwrap_err();
        assert!(matches!(err, DagError::GraphParse(_)));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = Graph::from_nodes(
            vec![],
            vec![("a".to_string(), spec(&[])), ("a".to_string(), spec(&[]))],
        )
        .unwrap_err();
        assert!(matches!(err, DagError::DuplicateNode(ref id) if id == "a"));
    }

    #[test]
    fn test_duplicate_yaml_key_rejected() {
        let yaml = "agents:\n  a: {}\n  a: {}\n";
        let err = Graph::from_yaml_str(yaml).unwrap_err();
        assert!(err.is_load_error());
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let err =
            Graph::from_nodes(vec![], vec![("root".to_string(), spec(&["ghost"]))]).unwrap_err();
        match err {
            DagError::DependencyNotFound { node, missing } => {
                assert_eq!(node, "root");
                assert_eq!(missing, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_rejected() {
        let err = Graph::from_nodes(vec![], vec![("a".to_string(), spec(&["a"]))]).unwrap_err();
        assert!(matches!(err, DagError::SelfDependency(_)));
    }

    #[test]
    fn test_repeated_child_rejected() {
        let yaml = r#"
agents:
  a: {}
  b: {children: [a, a]}
"#;
        match Graph::from_yaml_str(yaml).unwrap_err() {
            DagError::DuplicateChild { node, child } => {
                assert_eq!(node, "b");
                assert_eq!(child, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_rejected_at_load() {
        let yaml = r#"
agents:
  a: {children: [b]}
  b: {children: [c]}
  c: {children: [a]}
"#;
        let err = Graph::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, DagError::Cycle(_)));
    }

    #[test]
    fn test_unknown_root_rejected() {
        let err = Graph::from_nodes(vec!["nope".to_string()], vec![("a".to_string(), spec(&[]))])
            .unwrap_err();
        assert!(matches!(err, DagError::UnknownRoot(_)));
    }

    #[test]
    fn test_derived_roots_include_disconnected_nodes() {
        let graph = Graph::from_nodes(
            vec![],
            vec![
                ("leaf".to_string(), spec(&[])),
                ("mid".to_string(), spec(&["leaf"])),
                ("lonely".to_string(), spec(&[])),
            ],
        )
        .unwrap();
        assert_eq!(graph.roots(), vec!["lonely".to_string(), "mid".to_string()]);
    }

    #[test]
    fn test_declared_roots_win() {
        let graph = Graph::from_nodes(
            vec!["leaf".to_string()],
            vec![
                ("leaf".to_string(), spec(&[])),
                ("mid".to_string(), spec(&["leaf"])),
            ],
        )
        .unwrap();
        assert_eq!(graph.roots(), vec!["leaf".to_string()]);
    }

    #[test]
    fn test_parents_and_ancestors() {
        let graph = Graph::from_nodes(
            vec![],
            vec![
                ("leaf".to_string(), spec(&[])),
                ("mid".to_string(), spec(&["leaf"])),
                ("side".to_string(), spec(&["leaf"])),
                ("root".to_string(), spec(&["mid", "side"])),
            ],
        )
        .unwrap();
        assert_eq!(graph.parents("leaf"), &["mid".to_string(), "side".to_string()]);
        let ancestors: Vec<_> = graph.ancestors("leaf").into_iter().collect();
        assert_eq!(ancestors, vec!["mid", "root", "side"]);
        assert!(graph.ancestors("root").is_empty());
    }

    #[test]
    fn test_yaml_round_trip_preserves_structure() {
        let yaml = r#"
roots: [openAICall]
agents:
  weatherForecast:
    queryParameters: {lat: 1.5, lon: 2.5, units: metric}
  openAICall:
    kind: openAICall
    children: [weatherForecast]
    messages:
      - {role: user, content: "{{.weatherForecast}}"}
"#;
        let graph = Graph::from_yaml_str(yaml).unwrap();
        let text = graph.to_yaml_string().unwrap();
        let reloaded = Graph::from_yaml_str(&text).unwrap();
        assert_eq!(graph.to_spec(), reloaded.to_spec());
        assert_eq!(reloaded.declared_roots(), &["openAICall".to_string()]);
        assert_eq!(
            reloaded.node("weatherForecast").unwrap().params["queryParameters"]["lat"],
            serde_json::json!(1.5)
        );
    }
}
