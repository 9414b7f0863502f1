use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarbormindError {
    // Graph catalog errors
    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("Graph '{graph}' has duplicate node id: {node}")]
    DuplicateNodeId { graph: String, node: String },

    #[error("Graph '{graph}' entry node does not exist: {entry}")]
    MissingEntryNode { graph: String, entry: String },

    #[error("Graph '{graph}' node '{node}' references missing node: {target}")]
    DanglingNodeReference {
        graph: String,
        node: String,
        target: String,
    },

    #[error("Graph '{0}' has no nodes")]
    EmptyGraph(String),

    #[error("Graph definition parse error: {0}")]
    GraphParse(String),

    // Runner errors
    #[error("Handler '{node}' chose branch '{label}' not declared in next list")]
    BranchNotDeclared { node: String, label: String },

    #[error("Run exceeded step budget ({0} nodes visited)")]
    StepBudgetExceeded(usize),

    #[error("Handler execution failed: {handler}: {message}")]
    HandlerExecution { handler: String, message: String },

    #[error("Handler timeout after {timeout_secs}s: {handler}")]
    HandlerTimeout { handler: String, timeout_secs: u64 },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document not found: {collection}/{id}")]
    DocumentNotFound { collection: String, id: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarbormindError>;
