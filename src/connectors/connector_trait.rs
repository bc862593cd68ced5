use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use crate::engine::SqlDialect;
use crate::connectors::{MockConnector, MySqlConnector, PostgresConnector};
use crate::utils::{
    config::DatabaseConfig,
    types::{ConnectorType, Query, ResultSet},
    error::{AgentResult, ConnectorError},
};

/// Configuration for connector initialization
#[derive(Debug, Clone)]
pub struct ConnectorInitConfig {
    pub connection_url: Option<String>,
    pub ssl_mode: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub query_timeout_seconds: Option<u64>,
    pub max_connections: Option<u32>,
}

impl ConnectorInitConfig {
    /// Create a new connector configuration
    pub fn new() -> Self {
        Self {
            connection_url: None,
            ssl_mode: None,
            timeout_seconds: Some(30),
            query_timeout_seconds: None,
            max_connections: Some(4),
        }
    }

    /// Set the backend connection URL
    pub fn with_url(mut self, url: &str) -> Self {
        self.connection_url = Some(url.to_string());
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: &str) -> Self {
        self.ssl_mode = Some(ssl_mode.to_string());
        self
    }

    /// Set connect timeout in seconds
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Bound every backend call by `seconds`; zero leaves calls unbounded
    pub fn with_query_timeout(mut self, seconds: u64) -> Self {
        self.query_timeout_seconds = Some(seconds);
        self
    }

    /// Set maximum connections
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }

    /// Per-call deadline, `None` when queries may run as long as the backend allows
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_seconds
            .filter(|seconds| *seconds > 0)
            .map(Duration::from_secs)
    }

    /// Connection URL, required by every networked backend
    pub fn require_url(&self) -> AgentResult<&str> {
        self.connection_url.as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConnectorError::ConnectionFailed("connection url is required".to_string()).into())
    }
}

impl Default for ConnectorInitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&DatabaseConfig> for ConnectorInitConfig {
    fn from(config: &DatabaseConfig) -> Self {
        let mut init = ConnectorInitConfig::new()
            .with_ssl_mode(&config.ssl_mode)
            .with_timeout(config.connect_timeout)
            .with_max_connections(config.max_connections);
        init.connection_url = config.url.clone();
        init.query_timeout_seconds = config.query_timeout;
        init
    }
}

/// Execution engine for one relational backend.
///
/// Every backend behaves the same from the dispatcher's point of view: `probe`
/// checks liveness, `run` compiles and fully materializes a query, `close`
/// releases the backend and may be called any number of times.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish connection to the backend
    async fn connect(&mut self, config: ConnectorInitConfig) -> AgentResult<()>;

    /// Run a trivial liveness query
    async fn probe(&self) -> AgentResult<()>;

    /// Compile `query` with this backend's dialect, execute it, and collect every row
    async fn run(&self, query: &Query) -> AgentResult<ResultSet>;

    /// Close connection and cleanup resources
    async fn close(&mut self) -> AgentResult<()>;

    /// Get the type of this connector
    fn get_connector_type(&self) -> ConnectorType;

    /// Placeholder rules used to compile queries for this backend
    fn dialect(&self) -> SqlDialect {
        SqlDialect::for_connector(self.get_connector_type())
    }

    /// Check if the connector is currently connected
    fn is_connected(&self) -> bool;
}

/// Build the connector selected by configuration, not yet connected
pub fn create_connector(connector_type: ConnectorType) -> Box<dyn Connector> {
    match connector_type {
        ConnectorType::PostgreSQL => Box::new(PostgresConnector::new()),
        ConnectorType::MySQL => Box::new(MySqlConnector::new()),
        ConnectorType::Mock => Box::new(MockConnector::new()),
    }
}

/// Bound a backend call by `limit` when one is set, mapping expiry to
/// `ConnectorError::Timeout`
pub(crate) async fn with_deadline<T, F>(limit: Option<Duration>, what: &str, call: F) -> AgentResult<T>
where
    F: Future<Output = AgentResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call).await
            .map_err(|_| ConnectorError::Timeout(format!("{} exceeded {}s", what, limit.as_secs())))?,
        None => call.await,
    }
}
