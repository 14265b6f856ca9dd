use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use agentdag_core::config::AppConfig;
use agentdag_core::error::{DagError, Result};
use agentdag_core::event::EventBus;
use agentdag_core::traits::AgentWork;
use agentdag_core::types::{AgentContext, ChildResults, DagEvent, NodeOutcome, RunId};

use crate::dispatch::AgentRegistry;
use crate::graph::{Graph, Node};
use crate::registry::ResultRegistry;
use crate::sequencer;

/// Outcome of one graph run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    /// Dependency-first order the node tasks were started in.
    pub order: Vec<String>,
    /// Roots the caller is interested in.
    pub roots: Vec<String>,
    /// Every published outcome, keyed by node id.
    pub outcomes: BTreeMap<String, NodeOutcome>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn outcome(&self, id: &str) -> Option<&NodeOutcome> {
        self.outcomes.get(id)
    }

    /// True when every root produced a value.
    pub fn succeeded(&self) -> bool {
        self.roots
            .iter()
            .all(|r| self.outcomes.get(r).is_some_and(NodeOutcome::is_success))
    }

    /// Values of the roots that succeeded.
    pub fn root_results(&self) -> BTreeMap<String, String> {
        self.roots
            .iter()
            .filter_map(|r| {
                self.outcomes
                    .get(r)
                    .and_then(NodeOutcome::value)
                    .map(|v| (r.clone(), v.to_string()))
            })
            .collect()
    }

    /// `(node, reason)` for every node that did not succeed.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.outcomes
            .iter()
            .filter_map(|(id, o)| o.reason().map(|reason| (id.clone(), reason)))
            .collect()
    }

    /// Root values, or `RunFailed` naming every node without a result.
    pub fn into_result(self) -> Result<BTreeMap<String, String>> {
        if self.succeeded() {
            return Ok(self.root_results());
        }
        let failed = self
            .outcomes
            .iter()
            .filter(|(_, o)| !o.is_success())
            .map(|(id, _)| id.clone())
            .collect();
        Err(DagError::RunFailed { failed })
    }
}

/// Runs every node of a graph as its own task.
///
/// All node tasks are spawned at once. Each one waits on its children's
/// slots in the result registry, runs its work unit, and publishes exactly
/// one outcome under its own id. Independent branches therefore run
/// concurrently with no central scheduler.
pub struct Executor {
    graph: Arc<Graph>,
    agents: Arc<AgentRegistry>,
    config: Arc<AppConfig>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(graph: Arc<Graph>, agents: Arc<AgentRegistry>, config: Arc<AppConfig>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
        Self {
            graph,
            agents,
            config,
            event_bus,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Cancelling this token stops the run; unfinished nodes end up `Cancelled`.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Run the whole graph once and collect every node's outcome.
    ///
    /// Returns `Err` only when the run cannot start (unknown kind, cycle).
    /// Node failures are reported through the returned `RunReport`.
    pub async fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let run_id = RunId::new();

        let mut resolved = self.agents.resolve(&self.graph)?;
        let order = sequencer::sort(&self.graph)?;
        let registry = Arc::new(ResultRegistry::create_all(self.graph.ids()));
        let run_cancel = self.cancel.child_token();

        let engine = &self.config.engine;
        let limiter = (engine.max_parallel > 0).then(|| Arc::new(Semaphore::new(engine.max_parallel)));
        let timeout = (engine.node_timeout_secs > 0)
            .then(|| Duration::from_secs(engine.node_timeout_secs));

        let mut pending = Vec::with_capacity(order.len());
        for id in &order {
            let node = self
                .graph
                .node(id)
                .ok_or_else(|| DagError::UnknownNode(id.clone()))?;
            let agent = resolved
                .remove(id)
                .ok_or_else(|| DagError::UnknownAgentKind {
                    node: id.clone(),
                    kind: node.kind().to_string(),
                })?;
            pending.push(NodeTask {
                run_id: run_id.clone(),
                node: node.clone(),
                agent,
                registry: registry.clone(),
                config: self.config.clone(),
                event_bus: self.event_bus.clone(),
                cancel: run_cancel.clone(),
                limiter: limiter.clone(),
                timeout,
                fail_fast: engine.fail_fast,
            });
        }

        info!(
            run_id = %run_id,
            nodes = order.len(),
            max_parallel = engine.max_parallel,
            "Starting graph run"
        );
        self.event_bus.publish(DagEvent::RunStarted {
            run_id: run_id.clone(),
            total_nodes: order.len(),
            at: Utc::now(),
        });

        let mut tasks = JoinSet::new();
        let mut task_nodes: HashMap<task::Id, String> = HashMap::with_capacity(pending.len());
        for node_task in pending {
            let node_id = node_task.node.id.clone();
            let handle = tasks.spawn(node_task.run());
            task_nodes.insert(handle.id(), node_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let Err(e) = joined else {
                continue;
            };
            let Some(node_id) = task_nodes.get(&e.id()) else {
                error!(run_id = %run_id, error = %e, "Untracked node task aborted");
                continue;
            };
            error!(run_id = %run_id, node = %node_id, error = %e, "Node task aborted");
            // Parents may still be waiting on this node.
            let outcome = NodeOutcome::Failed(format!("node task aborted: {}", e));
            if let Err(publish_err) = registry.publish(node_id, outcome) {
                debug!(node = %node_id, error = %publish_err, "Aborted node had already published");
            }
        }

        let report = RunReport {
            run_id: run_id.clone(),
            order,
            roots: self.graph.roots(),
            outcomes: registry.snapshot(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        let succeeded = report.succeeded();
        if succeeded {
            info!(run_id = %run_id, elapsed_ms = report.elapsed_ms, "Graph run complete");
        } else {
            warn!(
                run_id = %run_id,
                failed = report.failures().len(),
                elapsed_ms = report.elapsed_ms,
                "Graph run finished with failures"
            );
        }
        self.event_bus.publish(DagEvent::RunFinished {
            run_id,
            succeeded,
            elapsed_ms: report.elapsed_ms,
            at: Utc::now(),
        });

        Ok(report)
    }
}

/// Everything one node's task owns.
struct NodeTask {
    run_id: RunId,
    node: Node,
    agent: Arc<dyn AgentWork>,
    registry: Arc<ResultRegistry>,
    config: Arc<AppConfig>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
    limiter: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    fail_fast: bool,
}

impl NodeTask {
    async fn run(self) {
        let start = Instant::now();
        let outcome = self.execute().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &outcome {
            NodeOutcome::Success(_) => {
                debug!(node = %self.node.id, elapsed_ms, "Node succeeded");
            }
            NodeOutcome::Failed(reason) => {
                warn!(node = %self.node.id, reason = %reason, elapsed_ms, "Node failed");
                if self.fail_fast {
                    info!(node = %self.node.id, "Fail-fast enabled, cancelling run");
                    self.cancel.cancel();
                }
            }
            NodeOutcome::Skipped { dependency } => {
                info!(node = %self.node.id, dependency = %dependency, "Node skipped");
            }
            NodeOutcome::Cancelled => {
                debug!(node = %self.node.id, "Node cancelled");
            }
        }

        self.event_bus.publish(DagEvent::NodeFinished {
            run_id: self.run_id.clone(),
            node_id: self.node.id.clone(),
            status: outcome.label().to_string(),
            elapsed_ms,
            at: Utc::now(),
        });

        if let Err(e) = self.registry.publish(&self.node.id, outcome) {
            error!(node = %self.node.id, error = %e, "Failed to publish node outcome");
        }
    }

    async fn execute(&self) -> NodeOutcome {
        let mut children = ChildResults::new();
        for child in &self.node.children {
            match self.registry.await_outcome(child, &self.cancel).await {
                Ok(NodeOutcome::Success(value)) => {
                    children.insert(child.clone(), value);
                }
                Ok(NodeOutcome::Failed(_)) | Ok(NodeOutcome::Skipped { .. }) => {
                    return NodeOutcome::Skipped {
                        dependency: child.clone(),
                    };
                }
                Ok(NodeOutcome::Cancelled) | Err(_) => return NodeOutcome::Cancelled,
            }
        }

        // Permits are taken only once inputs are ready, so a waiting node
        // never holds a slot its children need.
        let _permit = match &self.limiter {
            Some(limiter) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return NodeOutcome::Cancelled,
                permit = limiter.clone().acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return NodeOutcome::Cancelled,
                },
            },
            None => None,
        };

        if self.cancel.is_cancelled() {
            return NodeOutcome::Cancelled;
        }

        let kind = self.node.kind().to_string();
        info!(node = %self.node.id, kind = %kind, children = children.len(), "Executing node");
        self.event_bus.publish(DagEvent::NodeStarted {
            run_id: self.run_id.clone(),
            node_id: self.node.id.clone(),
            kind: kind.clone(),
            at: Utc::now(),
        });

        let ctx = AgentContext::new(
            self.node.id.clone(),
            kind,
            self.node.params.clone(),
            self.config.clone(),
        )
        .with_cancel(self.cancel.child_token());

        let invocation = async {
            // `run` itself may panic before returning a future.
            match AssertUnwindSafe(async { self.agent.run(ctx, children).await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(DagError::WorkUnit {
                    node: self.node.id.clone(),
                    message: "work unit panicked".to_string(),
                }),
            }
        };

        let bounded = async {
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, invocation)
                    .await
                    .unwrap_or_else(|_| {
                        Err(DagError::Timeout {
                            node: self.node.id.clone(),
                            secs: limit.as_secs(),
                        })
                    }),
                None => invocation.await,
            }
        };

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return NodeOutcome::Cancelled,
            result = bounded => result,
        };

        match result {
            Ok(value) => NodeOutcome::Success(value),
            Err(DagError::Cancelled) => NodeOutcome::Cancelled,
            Err(e) => NodeOutcome::Failed(e.to_string()),
        }
    }
}

/// Load the graph at `graph_path`, run it, and return the root values.
///
/// Any load error is returned before a single node starts. A run that leaves
/// some root without a value yields `RunFailed`; an externally cancelled run
/// yields `Cancelled`.
pub async fn execute(
    graph_path: &Path,
    config: Arc<AppConfig>,
    agents: Arc<AgentRegistry>,
    cancel: CancellationToken,
) -> Result<BTreeMap<String, String>> {
    let graph = Arc::new(Graph::load(graph_path)?);
    let report = Executor::new(graph, agents, config)
        .with_cancel(cancel.clone())
        .run()
        .await?;
    if cancel.is_cancelled() {
        return Err(DagError::Cancelled);
    }
    report.into_result()
}
