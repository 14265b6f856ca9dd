use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// One node's unit of work in the graph.
///
/// The executor awaits every child, hands the collected results to `run`,
/// and publishes whatever `run` returns (or the failure) under the node's
/// own id. Implementations never touch the result registry themselves.
pub trait AgentWork: Send + Sync + 'static {
    /// Kind name the graph source refers to.
    fn kind(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Environment variables this work unit needs at run time.
    fn required_env(&self) -> Vec<String> {
        Vec::new()
    }

    /// Perform the work and return the node's result.
    fn run(&self, ctx: AgentContext, children: ChildResults) -> BoxFuture<'_, Result<String>>;
}

/// Chat-completions client.
pub trait ChatClient: Send + Sync + 'static {
    /// Send a conversation and return the first choice's text.
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<String>>;
}
