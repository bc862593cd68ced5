use async_trait::async_trait;
use mysql_async::consts::ColumnType;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, SslOpts};
use std::time::Duration;

use crate::connectors::connector_trait::{with_deadline, Connector, ConnectorInitConfig};
use crate::utils::{
    types::{ConnectorType, Query, ResultSet, Row, SqlParam, Value},
    error::{AgentResult, ConnectorError},
};

/// MySQL connector backed by a mysql_async pool
#[derive(Debug)]
pub struct MySqlConnector {
    pool: Option<Pool>,
    connected: bool,
    query_timeout: Option<Duration>,
}

impl MySqlConnector {
    pub fn new() -> Self {
        Self {
            pool: None,
            connected: false,
            query_timeout: ConnectorInitConfig::new().query_timeout(),
        }
    }

    fn pool(&self) -> AgentResult<&Pool> {
        if !self.connected {
            return Err(ConnectorError::ConnectionFailed("Not connected".to_string()).into());
        }

        self.pool.as_ref()
            .ok_or_else(|| ConnectorError::ConnectionFailed("No connection pool available".to_string()).into())
    }
}

impl Default for MySqlConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Build pool options from the URL plus the agent's ssl mode and pool size.
///
/// `disable` and `prefer` connect in plaintext; `require`, `verify-ca` and
/// `verify-full` demand TLS, only the last two checking the certificate.
fn build_opts(config: &ConnectorInitConfig) -> AgentResult<Opts> {
    let url_opts = Opts::from_url(config.require_url()?)
        .map_err(|e| ConnectorError::ConnectionFailed(format!("Invalid connection url: {}", e)))?;

    let max = config.max_connections.unwrap_or(4).max(1) as usize;
    let constraints = PoolConstraints::new(0, max)
        .ok_or_else(|| ConnectorError::ConnectionFailed(format!("Invalid pool size: {}", max)))?;

    let mut opts = OptsBuilder::from_opts(url_opts)
        .pool_opts(PoolOpts::default().with_constraints(constraints));

    opts = match config.ssl_mode.as_deref().map(str::trim).unwrap_or("prefer") {
        "" | "disable" | "prefer" => opts,
        "require" => opts.ssl_opts(Some(SslOpts::default().with_danger_accept_invalid_certs(true))),
        "verify-ca" | "verify-full" => opts.ssl_opts(Some(SslOpts::default())),
        other => {
            return Err(ConnectorError::ConnectionFailed(format!("Unsupported ssl mode: {}", other)).into());
        }
    };

    Ok(opts.into())
}

/// Convert a statement parameter to a MySQL wire value
fn to_mysql_value(param: &SqlParam) -> AgentResult<mysql_async::Value> {
    Ok(match param {
        SqlParam::Null => mysql_async::Value::NULL,
        SqlParam::Bool(b) => mysql_async::Value::Int(*b as i64),
        SqlParam::Int(i) => mysql_async::Value::Int(*i),
        SqlParam::Float(f) => mysql_async::Value::Double(*f),
        SqlParam::Text(s) => mysql_async::Value::Bytes(s.as_bytes().to_vec()),
        SqlParam::List(_) => {
            return Err(ConnectorError::UnsupportedOperation(
                "list parameters cannot be bound to a MySQL placeholder".to_string()
            ).into());
        }
    })
}

/// Convert a MySQL cell to the internal Value representation
fn convert_mysql_value(value: &mysql_async::Value, column_type: ColumnType) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Int(v) => Value::Integer(*v),
        mysql_async::Value::UInt(v) => match i64::try_from(*v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Text(v.to_string()),
        },
        mysql_async::Value::Float(v) => Value::Float(*v as f64),
        mysql_async::Value::Double(v) => Value::Float(*v),
        mysql_async::Value::Bytes(bytes) if column_type == ColumnType::MYSQL_TYPE_JSON => {
            serde_json::from_slice(bytes)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::from_bytes(bytes))
        }
        mysql_async::Value::Bytes(bytes) => Value::from_bytes(bytes),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            if column_type == ColumnType::MYSQL_TYPE_DATE {
                Value::Date(format!("{:04}-{:02}-{:02}", year, month, day))
            } else if *micro > 0 {
                Value::DateTime(format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, min, sec, micro
                ))
            } else {
                Value::DateTime(format!(
                    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                ))
            }
        }
        mysql_async::Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let sign = if *is_negative { "-" } else { "" };
            let mut text = format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds);
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::Text(text)
        }
    }
}

fn convert_mysql_row(row: &mysql_async::Row) -> Row {
    let mut converted = Row::new();

    for (index, column) in row.columns_ref().iter().enumerate() {
        let value = row.as_ref(index)
            .map(|value| convert_mysql_value(value, column.column_type()))
            .unwrap_or(Value::Null);
        converted.insert(column.name_str().into_owned(), value);
    }

    converted
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&mut self, config: ConnectorInitConfig) -> AgentResult<()> {
        let opts = build_opts(&config)?;
        let timeout = config.connect_timeout();
        let pool = Pool::new(opts);

        // Test the connection
        let conn = tokio::time::timeout(timeout, pool.get_conn()).await
            .map_err(|_| ConnectorError::Timeout("Connection timeout".to_string()))?
            .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection: {}", e)))?;
        drop(conn);

        tracing::debug!(max_connections = config.max_connections.unwrap_or(4), "mysql pool ready");

        self.query_timeout = config.query_timeout();
        self.pool = Some(pool);
        self.connected = true;

        Ok(())
    }

    async fn probe(&self) -> AgentResult<()> {
        let pool = self.pool()?;

        with_deadline(self.query_timeout, "probe", async {
            let mut conn = pool.get_conn().await
                .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection from pool: {}", e)))?;

            let answer: Option<i64> = conn.query_first("SELECT 1").await
                .map_err(|e| ConnectorError::QueryExecutionFailed(e.to_string()))?;

            match answer {
                Some(1) => Ok(()),
                other => Err(ConnectorError::QueryExecutionFailed(
                    format!("unexpected probe result: {:?}", other)
                ).into()),
            }
        }).await
    }

    async fn run(&self, query: &Query) -> AgentResult<ResultSet> {
        let pool = self.pool()?;
        let statement = self.dialect().compile(query)?;
        let values = statement.parameters.iter()
            .map(to_mysql_value)
            .collect::<AgentResult<Vec<_>>>()?;

        tracing::debug!(sql = %statement.text, parameters = values.len(), "executing statement");

        with_deadline(self.query_timeout, "query", async {
            // Connection goes back to the pool when `conn` drops
            let mut conn = pool.get_conn().await
                .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection from pool: {}", e)))?;

            let mysql_rows: Vec<mysql_async::Row> = conn.exec(statement.text.as_str(), Params::from(values)).await
                .map_err(|e| ConnectorError::QueryExecutionFailed(e.to_string()))?;

            Ok(ResultSet::new(mysql_rows.iter().map(convert_mysql_row).collect()))
        }).await
    }

    async fn close(&mut self) -> AgentResult<()> {
        self.connected = false;
        if let Some(pool) = self.pool.take() {
            pool.disconnect().await
                .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to close pool: {}", e)))?;
            tracing::debug!("mysql pool closed");
        }
        Ok(())
    }

    fn get_connector_type(&self) -> ConnectorType {
        ConnectorType::MySQL
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
