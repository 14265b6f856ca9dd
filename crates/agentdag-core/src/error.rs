use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Graph errors
    #[error("Graph parse error: {0}")]
    GraphParse(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Dependency not found: node '{node}' depends on '{missing}'")]
    DependencyNotFound { node: String, missing: String },

    #[error("Node '{0}' lists itself as a child")]
    SelfDependency(String),

    #[error("Node '{node}' lists child '{child}' more than once")]
    DuplicateChild { node: String, child: String },

    #[error("Declared root not found in graph: {0}")]
    UnknownRoot(String),

    #[error("Cycle detected: {0}")]
    Cycle(String),

    #[error("No agent registered for kind '{kind}' (node '{node}')")]
    UnknownAgentKind { node: String, kind: String },

    // Registry errors
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Result already published for node: {0}")]
    AlreadyPublished(String),

    // Work unit errors
    #[error("Work unit failed: {node}: {message}")]
    WorkUnit { node: String, message: String },

    #[error("Missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Node {node} timed out after {secs}s")]
    Timeout { node: String, secs: u64 },

    // Run errors
    #[error("Run cancelled")]
    Cancelled,

    #[error("Run failed; nodes without a result: {}", failed.join(", "))]
    RunFailed { failed: Vec<String> },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DagError {
    /// True for errors raised while loading or validating a graph, before
    /// any node has been started.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            DagError::Config(_)
                | DagError::ConfigNotFound(_)
                | DagError::GraphParse(_)
                | DagError::DuplicateNode(_)
                | DagError::DependencyNotFound { .. }
                | DagError::SelfDependency(_)
                | DagError::DuplicateChild { .. }
                | DagError::UnknownRoot(_)
                | DagError::Cycle(_)
                | DagError::UnknownAgentKind { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_failed_lists_nodes() {
        let err = DagError::RunFailed {
            failed: vec!["weather".into(), "summary".into()],
        };
        assert_eq!(
            err.to_string(),
            "Run failed; nodes without a result: weather, summary"
        );
    }

    #[test]
    fn test_load_error_classification() {
        assert!(DagError::Cycle("a -> b -> a".into()).is_load_error());
        assert!(DagError::DuplicateNode("a".into()).is_load_error());
        assert!(DagError::DuplicateChild {
            node: "b".into(),
            child: "a".into()
        }
        .is_load_error());
        assert!(!DagError::Cancelled.is_load_error());
        assert!(!DagError::MissingCredential("KEY".into()).is_load_error());
    }
}
