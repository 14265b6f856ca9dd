use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use agentdag_core::error::{DagError, Result};
use agentdag_core::traits::AgentWork;

use crate::graph::Graph;

/// Registry of work units, keyed by kind.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentWork>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    /// Register a work unit under its own kind. Replaces any previous one.
    pub fn register(&mut self, agent: impl AgentWork) {
        self.register_arc(Arc::new(agent));
    }

    pub fn register_arc(&mut self, agent: Arc<dyn AgentWork>) {
        let kind = agent.kind().to_string();
        self.agents.insert(kind, agent);
    }

    /// Unregister a work unit by kind.
    pub fn unregister(&mut self, kind: &str) -> bool {
        self.agents.remove(kind).is_some()
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn AgentWork>> {
        self.agents.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.agents.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.agents.keys().map(|s| s.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    /// `(kind, description)` pairs, sorted by kind.
    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.kinds()
            .into_iter()
            .filter_map(|k| self.agents.get(k).map(|a| (k, a.description())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Map every node of `graph` to its work unit.
    ///
    /// Fails on the first node (in id order) whose kind is not registered, so
    /// nothing starts running for a graph that cannot complete.
    pub fn resolve(&self, graph: &Graph) -> Result<HashMap<String, Arc<dyn AgentWork>>> {
        graph
            .nodes()
            .map(|node| {
                self.get(node.kind())
                    .map(|agent| (node.id.clone(), agent))
                    .ok_or_else(|| DagError::UnknownAgentKind {
                        node: node.id.clone(),
                        kind: node.kind().to_string(),
                    })
            })
            .collect()
    }

    /// Environment variables needed by the work units `graph` uses.
    pub fn required_env(&self, graph: &Graph) -> BTreeSet<String> {
        graph
            .nodes()
            .filter_map(|node| self.agents.get(node.kind()))
            .flat_map(|agent| agent.required_env())
            .collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
