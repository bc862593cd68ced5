use thiserror::Error;

/// Main error type for the agent
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatcherError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while turning a DSL payload into SQL
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("unsupported condition type: {0}")]
    UnsupportedOperator(String),
}

/// Backend connection and execution errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connection to backend failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("Timeout occurred: {0}")]
    Timeout(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Job routing errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("unhandled job kind: {0}")]
    UnknownJobKind(String),

    #[error("job kind not implemented: {0}")]
    NotImplemented(String),

    #[error("failed to serialize result: {0}")]
    Serialization(String),
}

/// Controller RPC failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("controller responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

impl AgentError {
    /// Message suitable for a job's `error_message`, without the layer prefix
    pub fn job_message(&self) -> String {
        match self {
            AgentError::Query(e) => e.to_string(),
            AgentError::Connector(e) => e.to_string(),
            AgentError::Dispatcher(e) => e.to_string(),
            AgentError::Transport(e) => e.to_string(),
            AgentError::Configuration(msg) | AgentError::Internal(msg) => msg.clone(),
        }
    }
}
