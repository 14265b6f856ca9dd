//! Mock agents and fixtures shared by the agentdag test suites.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;

use agentdag_core::config::AppConfig;
use agentdag_core::error::{DagError, Result};
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults};
use agentdag_engine::{Graph, NodeSpec};

type Script = dyn Fn(&AgentContext, &ChildResults) -> Result<String> + Send + Sync;

/// Agent whose output is computed by a closure, optionally after a delay.
pub struct ScriptedAgent {
    kind: String,
    delay: Duration,
    script: Box<Script>,
}

impl ScriptedAgent {
    pub fn new<F>(kind: impl Into<String>, script: F) -> Self
    where
        F: Fn(&AgentContext, &ChildResults) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            delay: Duration::ZERO,
            script: Box::new(script),
        }
    }

    /// Always returns `value`.
    pub fn constant(kind: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(kind, move |_, _| Ok(value.clone()))
    }

    /// Joins child values (in child-id order) with `sep`.
    pub fn joining(kind: impl Into<String>, sep: &'static str) -> Self {
        Self::new(kind, move |_, children| {
            Ok(children.values().cloned().collect::<Vec<_>>().join(sep))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl AgentWork for ScriptedAgent {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.script)(&ctx, &children)
        })
    }
}

/// Agent that always fails with the given message.
pub struct FailingAgent {
    kind: String,
    message: String,
}

impl FailingAgent {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl AgentWork for FailingAgent {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn run(&self, ctx: AgentContext, _children: ChildResults) -> BoxFuture<'_, Result<String>> {
        let message = self.message.clone();
        Box::pin(async move { Err(ctx.fail(message)) })
    }
}

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub node_id: String,
    pub children: ChildResults,
    pub started: Instant,
    pub finished: Instant,
}

/// Agent that sleeps for `delay`, records when it ran, and returns its node id.
pub struct RecordingAgent {
    kind: String,
    delay: Duration,
    log: Arc<Mutex<Vec<Invocation>>>,
}

impl RecordingAgent {
    pub fn new(kind: impl Into<String>, delay: Duration) -> Self {
        Self {
            kind: kind.into(),
            delay,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the invocation log; stays valid after the agent is registered.
    pub fn log(&self) -> Arc<Mutex<Vec<Invocation>>> {
        self.log.clone()
    }
}

impl AgentWork for RecordingAgent {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let started = Instant::now();
            tokio::time::sleep(self.delay).await;
            let finished = Instant::now();
            let mut log = self
                .log
                .lock()
                .map_err(|_| DagError::WorkUnit {
                    node: ctx.node_id.clone(),
                    message: "invocation log poisoned".to_string(),
                })?;
            log.push(Invocation {
                node_id: ctx.node_id.clone(),
                children,
                started,
                finished,
            });
            Ok(ctx.node_id)
        })
    }
}

/// Find a node's invocation in a recording log.
pub fn invocation(log: &Arc<Mutex<Vec<Invocation>>>, node_id: &str) -> Option<Invocation> {
    log.lock()
        .ok()?
        .iter()
        .find(|i| i.node_id == node_id)
        .cloned()
}

/// Build a graph from `(id, kind, children)` triples.
pub fn graph_of(nodes: &[(&str, &str, &[&str])]) -> Result<Graph> {
    Graph::from_nodes(
        Vec::new(),
        nodes.iter().map(|(id, kind, children)| {
            (
                id.to_string(),
                NodeSpec::new()
                    .with_kind(*kind)
                    .with_children(children.iter().copied()),
            )
        }),
    )
}

/// Default config with the LLM key filled in so no test reads the environment.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.llm.api_key = Some("test-key".to_string());
    config.llm.retry.max_retries = 0;
    config
}
