use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

/// Every failure the chain executor, hooks and federated store can surface.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The validation gate rejected the chain before anything was executed.
    #[error("Operation chain is invalid. {}", .messages.join(", "))]
    Validation { messages: Vec<String> },

    /// A hook refused to let the chain proceed.
    #[error("Hook {hook} rejected the operation chain: {reason}")]
    HookRejected { hook: String, reason: String },

    /// A single delegate store failed (dispatch, iteration or timeout).
    #[error("Delegate graph {graph_id} failed: {source}")]
    Delegate {
        graph_id: String,
        #[source]
        source: Box<GraphError>,
    },

    /// One or more delegate streams could not be released on close.
    #[error("Failed to release delegate resources: {}", .failures.join("; "))]
    ResourceRelease { failures: Vec<String> },

    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Operation chain was cancelled")]
    Cancelled,

    #[error("Graph not found or not visible: {0}")]
    UnknownGraph(String),

    #[error("Graph {0} is already registered")]
    DuplicateGraph(String),

    #[error("Exceeded results limit of {limit}")]
    ResultsLimitExceeded { limit: usize },

    #[error("Operation {operation} is not supported here: {reason}")]
    UnsupportedOperation {
        operation: &'static str,
        reason: String,
    },

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    /// Internal failure of a store implementation.
    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl GraphError {
    pub fn delegate(graph_id: impl Into<String>, source: GraphError) -> Self {
        // An error that already names its delegate keeps the innermost graph id.
        match source {
            already @ GraphError::Delegate { .. } => already,
            source => GraphError::Delegate {
                graph_id: graph_id.into(),
                source: Box::new(source),
            },
        }
    }

    pub fn hook_rejected(hook: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::HookRejected {
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Rejections are terminal for the request and never retried.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GraphError::Validation { .. } | GraphError::HookRejected { .. }
        )
    }
}
