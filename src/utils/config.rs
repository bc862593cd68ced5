use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::utils::error::{AgentError, AgentResult};
use crate::utils::types::ConnectorType;

/// Main agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    pub controller: ControllerConfig,
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

/// Controller endpoint and credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    pub url: String,
    pub connector_id: String,
    pub auth_token: String,
    pub request_timeout: u64, // seconds
}

/// Backend database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub backend: ConnectorType,
    pub url: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub connect_timeout: u64, // seconds
    pub query_timeout: Option<u64>, // seconds, unbounded when unset
}

/// Loop cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    pub poll_interval: u64,      // seconds
    pub heartbeat_interval: u64, // seconds
}

/// Log output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" | "jsonl" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

impl AgentConfig {
    /// Check the invariants the agent relies on before any loop starts
    pub fn validate(&self) -> AgentResult<()> {
        if self.controller.url.trim().is_empty() {
            return Err(AgentError::Configuration("controller url is required".to_string()));
        }
        if self.controller.connector_id.trim().is_empty() {
            return Err(AgentError::Configuration("connector id is required".to_string()));
        }
        if self.controller.auth_token.trim().is_empty() {
            return Err(AgentError::Configuration("auth token is required".to_string()));
        }
        if self.database.backend != ConnectorType::Mock
            && self.database.url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(AgentError::Configuration(
                format!("database url is required for the {} backend", self.database.backend)
            ));
        }
        if self.schedule.poll_interval == 0 || self.schedule.heartbeat_interval == 0 {
            return Err(AgentError::Configuration("intervals must be greater than zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(AgentError::Configuration("max connections must be greater than zero".to_string()));
        }
        Ok(())
    }
}

impl ScheduleConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            database: DatabaseConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9001".to_string(),
            connector_id: String::new(),
            auth_token: String::new(),
            request_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: ConnectorType::PostgreSQL,
            url: None,
            ssl_mode: "prefer".to_string(),
            max_connections: 4,
            connect_timeout: 30,
            query_timeout: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            poll_interval: 5,
            heartbeat_interval: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
