use base64::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Condition operators understood by the DSL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Like,
    In,
    IsNull,
    IsNotNull,
    /// Operator name this agent does not know; rejected when compiled
    Unsupported(String),
}

impl ConditionOperator {
    /// Resolve a DSL operator name
    pub fn from_name(name: &str) -> Self {
        match name {
            "equal" => ConditionOperator::Equal,
            "not_equal" => ConditionOperator::NotEqual,
            "greater_than" => ConditionOperator::GreaterThan,
            "greater_or_equal" | "greater_than_or_equal" => ConditionOperator::GreaterOrEqual,
            "less_than" => ConditionOperator::LessThan,
            "less_or_equal" | "less_than_or_equal" => ConditionOperator::LessOrEqual,
            "like" => ConditionOperator::Like,
            "in" => ConditionOperator::In,
            "is_null" => ConditionOperator::IsNull,
            "is_not_null" => ConditionOperator::IsNotNull,
            other => ConditionOperator::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConditionOperator::Equal => "equal",
            ConditionOperator::NotEqual => "not_equal",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::GreaterOrEqual => "greater_or_equal",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::LessOrEqual => "less_or_equal",
            ConditionOperator::Like => "like",
            ConditionOperator::In => "in",
            ConditionOperator::IsNull => "is_null",
            ConditionOperator::IsNotNull => "is_not_null",
            ConditionOperator::Unsupported(name) => name,
        }
    }

    /// Whether the operator binds a value
    pub fn takes_value(&self) -> bool {
        !matches!(
            self,
            ConditionOperator::IsNull | ConditionOperator::IsNotNull | ConditionOperator::Unsupported(_)
        )
    }
}

impl From<String> for ConditionOperator {
    fn from(name: String) -> Self {
        ConditionOperator::from_name(&name)
    }
}

impl From<ConditionOperator> for String {
    fn from(operator: ConditionOperator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<SqlParam>),
}

impl SqlParam {
    pub fn is_list(&self) -> bool {
        matches!(self, SqlParam::List(_))
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        SqlParam::Int(value as i64)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Float(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl<T: Into<SqlParam>> From<Vec<T>> for SqlParam {
    fn from(values: Vec<T>) -> Self {
        SqlParam::List(values.into_iter().map(Into::into).collect())
    }
}

/// A single WHERE or HAVING predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub operator: ConditionOperator,
    pub value: Option<SqlParam>,
}

impl Condition {
    pub fn new(column: &str, operator: ConditionOperator, value: Option<SqlParam>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            value,
        }
    }
}

/// Validated DSL query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub schema: Option<String>,
    pub projection: Option<String>,
    pub conditions: Vec<Condition>,
    pub group_by: Vec<String>,
    pub having: Vec<Condition>,
    pub limit: Option<i64>,
}

impl Query {
    /// Create a query selecting every column of `table`
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            schema: None,
            projection: None,
            conditions: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            limit: None,
        }
    }

    pub fn with_schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn with_projection(mut self, projection: &str) -> Self {
        self.projection = Some(projection.to_string());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn with_having(mut self, condition: Condition) -> Self {
        self.having.push(condition);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// SQL text plus its ordered bound parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledStatement {
    pub text: String,
    pub parameters: Vec<SqlParam>,
}

/// Individual cell values in a result row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(String),     // ISO 8601 format
    DateTime(String), // ISO 8601 format
    Json(JsonValue),
    Null,
}

impl Value {
    /// Normalize a binary column to text: UTF-8 when valid, base64 otherwise
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Text(BASE64_STANDARD.encode(bytes)),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Text(s) | Value::Date(s) | Value::DateTime(s) => JsonValue::String(s.clone()),
            Value::Integer(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Json(v) => v.clone(),
            Value::Null => JsonValue::Null,
        }
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::Text(s),
            other => Value::Json(other),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Value::from)
    }
}

/// A result row keyed by column name
pub type Row = BTreeMap<String, Value>;

/// Fully materialized query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub row_count: usize,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        let row_count = rows.len();
        Self { rows, row_count }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Connector types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    Mock,
    PostgreSQL,
    MySQL,
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorType::Mock => write!(f, "mock"),
            ConnectorType::PostgreSQL => write!(f, "postgres"),
            ConnectorType::MySQL => write!(f, "mysql"),
        }
    }
}

impl FromStr for ConnectorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(ConnectorType::Mock),
            "postgres" | "postgresql" => Ok(ConnectorType::PostgreSQL),
            "mysql" => Ok(ConnectorType::MySQL),
            other => Err(format!("unknown backend '{}', expected postgres, mysql or mock", other)),
        }
    }
}

/// Job kinds exchanged with the controller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    Ping,
    FetchColumns,
    DslQuery,
    SchemaRefresh,
    Unknown(String),
}

impl JobKind {
    /// Kinds advertised to the controller when polling
    pub const SUPPORTED: [JobKind; 4] = [
        JobKind::Ping,
        JobKind::FetchColumns,
        JobKind::DslQuery,
        JobKind::SchemaRefresh,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            JobKind::Ping => "ping",
            JobKind::FetchColumns => "fetch_columns",
            JobKind::DslQuery => "dsl_query",
            JobKind::SchemaRefresh => "schema_refresh",
            JobKind::Unknown(name) => name,
        }
    }
}

impl From<String> for JobKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "ping" => JobKind::Ping,
            "fetch_columns" => JobKind::FetchColumns,
            "dsl_query" => JobKind::DslQuery,
            "schema_refresh" => JobKind::SchemaRefresh,
            _ => JobKind::Unknown(name),
        }
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work fetched from the controller
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Raw JSON payload, decoded only by the handler that owns the kind
    pub payload: String,
}

impl Job {
    pub fn new(id: &str, kind: JobKind, payload: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            payload: payload.to_string(),
        }
    }
}

/// Uniform envelope reported for every job
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub succeeded: bool,
    pub result_payload: String,
    pub error_message: String,
}

impl JobOutcome {
    pub const EMPTY_RESULT: &'static str = "{}";

    pub fn success(result_payload: String) -> Self {
        Self {
            succeeded: true,
            result_payload,
            error_message: String::new(),
        }
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            result_payload: Self::EMPTY_RESULT.to_string(),
            error_message: error_message.into(),
        }
    }
}
