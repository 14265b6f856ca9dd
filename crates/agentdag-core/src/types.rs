use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{DagError, Result};

/// Free-form per-node parameters, passed verbatim from the graph source.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Published results of a node's children, keyed by child id.
pub type ChildResults = BTreeMap<String, String>;

/// Unique identifier of one execution run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single value a node publishes when it finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The work unit returned a result.
    Success(String),
    /// The work unit itself failed.
    Failed(String),
    /// The node never ran because a child did not succeed.
    Skipped { dependency: String },
    /// The run was cancelled before the node finished.
    Cancelled,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            NodeOutcome::Success(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Short status label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            NodeOutcome::Success(_) => "success",
            NodeOutcome::Failed(_) => "failed",
            NodeOutcome::Skipped { .. } => "skipped",
            NodeOutcome::Cancelled => "cancelled",
        }
    }

    /// Human-readable reason for a non-successful outcome.
    pub fn reason(&self) -> Option<String> {
        match self {
            NodeOutcome::Success(_) => None,
            NodeOutcome::Failed(reason) => Some(reason.clone()),
            NodeOutcome::Skipped { dependency } => {
                Some(format!("dependency '{}' did not succeed", dependency))
            }
            NodeOutcome::Cancelled => Some("cancelled".to_string()),
        }
    }
}

/// Everything a work unit sees about the node it is running for.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub node_id: String,
    pub kind: String,
    pub params: Arc<Params>,
    pub config: Arc<AppConfig>,
    pub cancel: CancellationToken,
}

impl AgentContext {
    pub fn new(
        node_id: impl Into<String>,
        kind: impl Into<String>,
        params: Arc<Params>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            kind: kind.into(),
            params,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a string parameter.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Deserialize an optional parameter into `T`.
    pub fn param<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| self.fail(format!("invalid parameter '{}': {}", key, e))),
        }
    }

    /// Deserialize a required parameter into `T`.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.param(key)?
            .ok_or_else(|| self.fail(format!("missing parameter '{}'", key)))
    }

    /// Build a work-unit error attributed to this node.
    pub fn fail(&self, message: impl Into<String>) -> DagError {
        DagError::WorkUnit {
            node: self.node_id.clone(),
            message: message.into(),
        }
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Any other role (`developer`, `tool`, ...), passed through verbatim.
    #[serde(untagged)]
    Other(String),
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// A fully resolved chat-completions request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub url: String,
    pub method: String,
    pub model: String,
    pub api_key: String,
    pub messages: Vec<ChatMessage>,
}

/// Events emitted over the `EventBus` during a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DagEvent {
    RunStarted {
        run_id: RunId,
        total_nodes: usize,
        at: DateTime<Utc>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: String,
        kind: String,
        at: DateTime<Utc>,
    },
    NodeFinished {
        run_id: RunId,
        node_id: String,
        status: String,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        succeeded: bool,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
}
