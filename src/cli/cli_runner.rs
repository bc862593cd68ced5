use clap::Parser;
use crate::cli::{AgentArgs, CliArgs, Commands, LoggingArgs, OutputFormat, OutputFormatter};
use crate::connectors::{create_connector, ConnectorInitConfig};
use crate::engine::{install_shutdown_handler, Agent, SqlDialect};
use crate::utils::{
    config::{DatabaseConfig, LoggingConfig},
    error::{AgentError, AgentResult},
    logging::init_logging,
    types::{CompiledStatement, ConnectorType, Query},
};

/// Executes one CLI command
pub struct CliRunner;

impl CliRunner {
    /// Start the agent and block until SIGINT or SIGTERM
    pub async fn run_agent(args: &AgentArgs, logging: &LoggingArgs) -> AgentResult<()> {
        let config = args.to_config(logging);
        let agent = Agent::from_config(&config).await?;
        let shutdown = install_shutdown_handler();
        agent.run(shutdown).await
    }

    /// Read a payload argument: inline JSON, or `@path` for a file
    pub fn read_payload(argument: &str) -> AgentResult<String> {
        match argument.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| AgentError::Configuration(format!("Failed to read payload file '{}': {}", path, e))),
            None => Ok(argument.to_string()),
        }
    }

    /// Parse and compile a payload with `dialect`
    pub fn compile(argument: &str, dialect: &SqlDialect) -> AgentResult<CompiledStatement> {
        let payload = Self::read_payload(argument)?;
        let query = Query::parse(&payload)?;
        dialect.compile(&query)
    }

    /// Connect, probe once, and close
    pub async fn probe(database: &DatabaseConfig) -> AgentResult<String> {
        if database.backend != ConnectorType::Mock
            && database.url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(AgentError::Configuration(
                format!("database url is required for the {} backend", database.backend)
            ));
        }

        let mut connector = create_connector(database.backend);
        connector.connect(ConnectorInitConfig::from(database)).await?;

        let probed = connector.probe().await;
        if let Err(e) = connector.close().await {
            tracing::warn!(error = %e, "failed to close backend after probe");
        }
        probed?;

        Ok(format!("{} backend is reachable", database.backend))
    }
}

/// Main entry point for CLI execution
pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let logging = LoggingConfig::from(&args.logging);

    if let Err(e) = init_logging(&logging) {
        eprintln!("{}", OutputFormatter::format_error(&e));
        std::process::exit(1);
    }

    let result = match &args.command {
        Commands::Run(agent_args) => CliRunner::run_agent(agent_args, &args.logging).await,

        Commands::Compile { payload, dialect, format } => {
            CliRunner::compile(payload, dialect).map(|statement| {
                println!("{}", OutputFormatter::format_statement(&statement, dialect, format));
                if *format == OutputFormat::Table {
                    eprintln!("{}", OutputFormatter::format_info(&format!("compiled for {}", dialect.name)));
                }
            })
        }

        Commands::Probe(database_args) => {
            CliRunner::probe(&DatabaseConfig::from(database_args)).await
                .map(|message| println!("{}", OutputFormatter::format_success(&message)))
        }
    };

    if let Err(e) = result {
        eprintln!("{}", OutputFormatter::format_error(&e));
        std::process::exit(1);
    }

    Ok(())
}
