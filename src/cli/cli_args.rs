use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::engine::SqlDialect;
use crate::utils::{
    config::{AgentConfig, ControllerConfig, DatabaseConfig, LogFormat, LoggingConfig, ScheduleConfig},
    types::ConnectorType,
};

/// sqlrunner agent - runs DSL queries against a database on behalf of a controller
#[derive(Parser, Debug)]
#[command(name = "sqlrunner-agent")]
#[command(about = "Remote SQL execution agent")]
#[command(version)]
pub struct CliArgs {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the controller and process jobs until interrupted
    Run(AgentArgs),

    /// Compile a DSL payload to SQL without touching a database
    Compile {
        /// DSL payload as JSON text, or @path to read it from a file
        #[arg(value_name = "PAYLOAD")]
        payload: String,

        /// Target dialect
        #[arg(short, long, default_value = "postgres", value_parser = parse_dialect)]
        dialect: SqlDialect,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Connect to the configured database and run the liveness probe once
    Probe(DatabaseArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    /// Log level or filter directives; RUST_LOG takes precedence when set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log line format: compact or json
    #[arg(long, global = true, env = "LOG_FORMAT", default_value = "compact")]
    pub log_format: LogFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ControllerArgs {
    /// Base URL of the controller
    #[arg(long, env = "CONTROLLER_URL", default_value = "http://localhost:9001")]
    pub controller_url: String,

    /// Connector this agent serves
    #[arg(long, env = "CONNECTOR_ID")]
    pub connector_id: String,

    /// Bearer token sent with every controller request
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: String,

    /// Controller request timeout in seconds
    #[arg(long, env = "CONTROLLER_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub struct DatabaseArgs {
    /// Database connection URL
    #[arg(long, env = "DB_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database backend: postgres, mysql or mock
    #[arg(long, env = "DB_BACKEND", default_value = "postgres")]
    pub backend: ConnectorType,

    /// TLS mode: disable, prefer, require, verify-ca or verify-full
    #[arg(long, env = "DB_SSL_MODE", default_value = "prefer")]
    pub ssl_mode: String,

    /// Maximum pooled connections
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 4)]
    pub max_connections: u32,

    /// Connect timeout in seconds
    #[arg(long, env = "DB_CONNECT_TIMEOUT_SECS", default_value_t = 30)]
    pub connect_timeout: u64,

    /// Per-query timeout in seconds, unbounded when unset
    #[arg(long, env = "DB_QUERY_TIMEOUT_SECS")]
    pub query_timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Seconds between job polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 5)]
    pub poll_interval: u64,

    /// Seconds between heartbeats
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval: u64,
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    #[command(flatten)]
    pub controller: ControllerArgs,

    #[command(flatten)]
    pub database: DatabaseArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Formatted table output
    Table,
    /// JSON output
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn parse_dialect(name: &str) -> Result<SqlDialect, String> {
    SqlDialect::from_name(name)
        .ok_or_else(|| format!("unknown dialect '{}', expected postgres or mysql", name))
}

impl From<&LoggingArgs> for LoggingConfig {
    fn from(args: &LoggingArgs) -> Self {
        LoggingConfig {
            level: args.log_level.clone(),
            format: args.log_format,
        }
    }
}

impl From<&DatabaseArgs> for DatabaseConfig {
    fn from(args: &DatabaseArgs) -> Self {
        DatabaseConfig {
            backend: args.backend,
            url: args.database_url.clone(),
            ssl_mode: args.ssl_mode.clone(),
            max_connections: args.max_connections,
            connect_timeout: args.connect_timeout,
            query_timeout: args.query_timeout,
        }
    }
}

impl AgentArgs {
    /// Assemble the full agent configuration
    pub fn to_config(&self, logging: &LoggingArgs) -> AgentConfig {
        AgentConfig {
            controller: ControllerConfig {
                url: self.controller.controller_url.clone(),
                connector_id: self.controller.connector_id.clone(),
                auth_token: self.controller.auth_token.clone(),
                request_timeout: self.controller.request_timeout,
            },
            database: DatabaseConfig::from(&self.database),
            schedule: ScheduleConfig {
                poll_interval: self.schedule.poll_interval,
                heartbeat_interval: self.schedule.heartbeat_interval,
            },
            logging: LoggingConfig::from(logging),
        }
    }
}
