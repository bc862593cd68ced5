use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use crate::connectors::connector_trait::{Connector, ConnectorInitConfig};
use crate::engine::SqlDialect;
use crate::utils::{
    types::{CompiledStatement, Condition, ConditionOperator, ConnectorType, Query, ResultSet, Row, SqlParam, Value},
    error::{AgentResult, ConnectorError},
};

/// Statements compiled by a `MockConnector`, shared so tests can inspect them
/// after the connector has been handed to a dispatcher
pub type StatementLog = Arc<Mutex<Vec<CompiledStatement>>>;

/// Mock connector for testing with deterministic in-memory data
#[derive(Debug)]
pub struct MockConnector {
    connected: bool,
    tables: HashMap<String, Vec<Row>>,
    connection_delay_ms: u64,
    query_delay: Duration,
    dialect: SqlDialect,
    query_failure: Option<String>,
    probe_failure: Option<String>,
    statements: StatementLog,
}

impl MockConnector {
    /// Create a new mock connector with default test data
    pub fn new() -> Self {
        let mut connector = Self {
            connected: false,
            tables: HashMap::new(),
            connection_delay_ms: 10, // Simulate small connection delay
            query_delay: Duration::ZERO,
            dialect: SqlDialect::POSTGRES,
            query_failure: None,
            probe_failure: None,
            statements: Arc::new(Mutex::new(Vec::new())),
        };

        connector.initialize_test_data();
        connector
    }

    /// Create a mock connector with custom connection delay
    pub fn with_delay(delay_ms: u64) -> Self {
        let mut connector = Self::new();
        connector.connection_delay_ms = delay_ms;
        connector
    }

    /// Hold every `run` for `delay` after recording the statement
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Compile with another dialect than the default postgres one
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Make every `run` fail with `message` after compiling
    pub fn with_query_failure(mut self, message: &str) -> Self {
        self.query_failure = Some(message.to_string());
        self
    }

    /// Make every `probe` fail with `message`
    pub fn with_probe_failure(mut self, message: &str) -> Self {
        self.probe_failure = Some(message.to_string());
        self
    }

    /// Add or replace a table from column names and positional rows
    pub fn add_table(&mut self, table_name: &str, column_names: &[&str], rows: Vec<Vec<Value>>) {
        let rows = rows.into_iter()
            .map(|values| {
                column_names.iter()
                    .map(|name| name.to_string())
                    .zip(values)
                    .collect::<Row>()
            })
            .collect();

        self.tables.insert(table_name.to_string(), rows);
    }

    /// Handle on the compiled statement log
    pub fn statements(&self) -> StatementLog {
        Arc::clone(&self.statements)
    }

    fn initialize_test_data(&mut self) {
        self.add_table("users", &["id", "name", "email", "age", "active"], vec![
            vec![
                Value::Integer(1),
                Value::Text("Alice Johnson".to_string()),
                Value::Text("alice@example.com".to_string()),
                Value::Integer(30),
                Value::Boolean(true),
            ],
            vec![
                Value::Integer(2),
                Value::Text("Bob Smith".to_string()),
                Value::Text("bob@example.com".to_string()),
                Value::Integer(25),
                Value::Boolean(true),
            ],
            vec![
                Value::Integer(3),
                Value::Text("Charlie Brown".to_string()),
                Value::Null,
                Value::Integer(35),
                Value::Boolean(false),
            ],
        ]);

        self.add_table("products", &["id", "name", "price", "category"], vec![
            vec![
                Value::Integer(1),
                Value::Text("Laptop".to_string()),
                Value::Float(999.99),
                Value::Text("Electronics".to_string()),
            ],
            vec![
                Value::Integer(2),
                Value::Text("Coffee Mug".to_string()),
                Value::Float(12.50),
                Value::Text("Kitchen".to_string()),
            ],
        ]);
    }

    fn record(&self, statement: CompiledStatement) {
        if let Ok(mut log) = self.statements.lock() {
            log.push(statement);
        }
    }

    /// Apply WHERE filtering, projection and LIMIT to a table's rows
    fn evaluate(&self, query: &Query, rows: &[Row]) -> AgentResult<Vec<Row>> {
        if !query.group_by.is_empty() || !query.having.is_empty() {
            return Err(ConnectorError::UnsupportedOperation(
                "grouping is not supported by MockConnector".to_string()
            ).into());
        }

        let columns: Option<Vec<String>> = query.projection.as_deref()
            .map(str::trim)
            .filter(|p| *p != "*")
            .map(|p| p.split(',').map(|c| c.trim().to_string()).collect());

        let limit = query.limit.filter(|l| *l > 0).map(|l| l as usize).unwrap_or(usize::MAX);

        rows.iter()
            .filter(|row| query.conditions.iter().all(|condition| matches_condition(row, condition)))
            .take(limit)
            .map(|row| match &columns {
                None => Ok(row.clone()),
                Some(columns) => columns.iter()
                    .map(|column| {
                        row.get(column)
                            .map(|value| (column.clone(), value.clone()))
                            .ok_or_else(|| ConnectorError::QueryExecutionFailed(
                                format!("column \"{}\" does not exist", column)
                            ).into())
                    })
                    .collect::<AgentResult<Row>>(),
            })
            .collect()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate a single condition against a row, with SQL NULL semantics
fn matches_condition(row: &Row, condition: &Condition) -> bool {
    let value = row.get(&condition.column).unwrap_or(&Value::Null);

    match (&condition.operator, &condition.value) {
        (ConditionOperator::IsNull, _) => matches!(value, Value::Null),
        (ConditionOperator::IsNotNull, _) => !matches!(value, Value::Null),
        (ConditionOperator::In, Some(SqlParam::List(items))) => {
            items.iter().any(|item| compare(value, item) == Some(Ordering::Equal))
        }
        (ConditionOperator::Like, Some(SqlParam::Text(pattern))) => match value {
            Value::Text(text) => like(text, pattern),
            _ => false,
        },
        (operator, Some(param)) => {
            let ordering = compare(value, param);
            match operator {
                ConditionOperator::Equal => ordering == Some(Ordering::Equal),
                ConditionOperator::NotEqual => matches!(ordering, Some(o) if o != Ordering::Equal),
                ConditionOperator::GreaterThan => ordering == Some(Ordering::Greater),
                ConditionOperator::GreaterOrEqual => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                ConditionOperator::LessThan => ordering == Some(Ordering::Less),
                ConditionOperator::LessOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                _ => false,
            }
        }
        _ => false,
    }
}

fn compare(value: &Value, param: &SqlParam) -> Option<Ordering> {
    match (value, param) {
        (Value::Integer(v), SqlParam::Int(p)) => Some(v.cmp(p)),
        (Value::Integer(v), SqlParam::Float(p)) => (*v as f64).partial_cmp(p),
        (Value::Float(v), SqlParam::Float(p)) => v.partial_cmp(p),
        (Value::Float(v), SqlParam::Int(p)) => v.partial_cmp(&(*p as f64)),
        (Value::Text(v) | Value::Date(v) | Value::DateTime(v), SqlParam::Text(p)) => Some(v.as_str().cmp(p)),
        (Value::Boolean(v), SqlParam::Bool(p)) => Some(v.cmp(p)),
        _ => None,
    }
}

/// SQL LIKE with `%` and `_` wildcards
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    fn matches(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => (0..=text.len()).any(|skip| matches(&text[skip..], rest)),
            Some(('_', rest)) => !text.is_empty() && matches(&text[1..], rest),
            Some((ch, rest)) => text.first() == Some(ch) && matches(&text[1..], rest),
        }
    }

    matches(&text, &pattern)
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&mut self, _config: ConnectorInitConfig) -> AgentResult<()> {
        // Simulate connection delay
        if self.connection_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.connection_delay_ms)).await;
        }

        self.connected = true;
        Ok(())
    }

    async fn probe(&self) -> AgentResult<()> {
        if !self.connected {
            return Err(ConnectorError::ConnectionFailed("Not connected".to_string()).into());
        }

        match &self.probe_failure {
            Some(message) => Err(ConnectorError::QueryExecutionFailed(message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn run(&self, query: &Query) -> AgentResult<ResultSet> {
        if !self.connected {
            return Err(ConnectorError::ConnectionFailed("Not connected".to_string()).into());
        }

        let statement = self.dialect.compile(query)?;
        self.record(statement);

        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }

        if let Some(message) = &self.query_failure {
            return Err(ConnectorError::QueryExecutionFailed(message.clone()).into());
        }

        let rows = self.tables.get(&query.table)
            .ok_or_else(|| ConnectorError::QueryExecutionFailed(
                format!("relation \"{}\" does not exist", query.table)
            ))?;

        Ok(ResultSet::new(self.evaluate(query, rows)?))
    }

    async fn close(&mut self) -> AgentResult<()> {
        self.connected = false;
        Ok(())
    }

    fn get_connector_type(&self) -> ConnectorType {
        ConnectorType::Mock
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
