use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::net::IpAddr;
use std::time::Duration;
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::{NoTls, Row as PgRow};

use crate::connectors::connector_trait::{with_deadline, Connector, ConnectorInitConfig};
use crate::utils::{
    types::{ConnectorType, Query, ResultSet, Row, SqlParam, Value},
    error::{AgentError, AgentResult, ConnectorError},
};

/// PostgreSQL connector using tokio-postgres with connection pooling
#[derive(Debug)]
pub struct PostgresConnector {
    pool: Option<Pool>,
    connected: bool,
    query_timeout: Option<Duration>,
}

impl PostgresConnector {
    /// Create a new PostgreSQL connector
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

    /// Convert PostgreSQL row to a column-keyed row
    fn convert_pg_row(&self, pg_row: &PgRow) -> AgentResult<Row> {
        let mut row = Row::new();

        for (index, column) in pg_row.columns().iter().enumerate() {
            row.insert(column.name().to_string(), self.convert_pg_value(pg_row, index)?);
        }

        Ok(row)
    }

    /// Convert PostgreSQL value to internal Value representation
    fn convert_pg_value(&self, row: &PgRow, index: usize) -> AgentResult<Value> {
        let column = &row.columns()[index];
        let read_failed = |e: Box<dyn Error + Sync + Send>| -> AgentError {
            ConnectorError::QueryExecutionFailed(format!(
                "Failed to read column '{}': {}", column.name(), e
            )).into()
        };

        // SQL NULL maps to None whatever the column type
        let raw = row.try_get::<_, Option<RawColumn>>(index).map_err(|e| read_failed(e.into()))?;
        match raw {
            Some(RawColumn(bytes)) => decode_column(column.type_(), &bytes).map_err(read_failed),
            None => Ok(Value::Null),
        }
    }
}

impl Default for PostgresConnector {
    fn default() -> Self {
        Self::new()
    }
}

type DecodeResult<T> = Result<T, Box<dyn Error + Sync + Send>>;

/// Undecoded binary column bytes, handed to `decode_column`
struct RawColumn(Vec<u8>);

impl<'a> FromSql<'a> for RawColumn {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> DecodeResult<Self> {
        Ok(RawColumn(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Decode one binary-format value by its column type.
///
/// Arrays become JSON arrays of their decoded elements, enum labels and
/// domains read as their underlying representation. Any type without a
/// mapping is an error rather than a lossy rendering of the wire bytes.
fn decode_column(ty: &Type, raw: &[u8]) -> DecodeResult<Value> {
    match ty.kind() {
        Kind::Array(member) => decode_array(ty, member, raw),
        Kind::Enum(_) => Ok(Value::Text(String::from_sql(&Type::TEXT, raw)?)),
        Kind::Domain(base) => decode_column(base, raw),
        _ => decode_scalar(ty, raw),
    }
}

fn decode_array(ty: &Type, member: &Type, raw: &[u8]) -> DecodeResult<Value> {
    let items = Vec::<Option<RawColumn>>::from_sql(ty, raw)?
        .into_iter()
        .map(|element| match element {
            Some(RawColumn(bytes)) => decode_column(member, &bytes).map(|value| value.to_json()),
            None => Ok(JsonValue::Null),
        })
        .collect::<DecodeResult<Vec<_>>>()?;

    Ok(Value::Json(JsonValue::Array(items)))
}

fn decode_scalar(ty: &Type, raw: &[u8]) -> DecodeResult<Value> {
    let value = match ty.oid() {
        16 => Value::Boolean(bool::from_sql(ty, raw)?),               // BOOL
        18 => Value::Text((i8::from_sql(ty, raw)? as u8 as char).to_string()), // "char"
        21 => Value::Integer(i16::from_sql(ty, raw)? as i64),         // INT2
        23 => Value::Integer(i32::from_sql(ty, raw)? as i64),         // INT4
        20 => Value::Integer(i64::from_sql(ty, raw)?),                // INT8
        26 => Value::Integer(u32::from_sql(ty, raw)? as i64),         // OID
        700 => Value::Float(f32::from_sql(ty, raw)? as f64),          // FLOAT4
        701 => Value::Float(f64::from_sql(ty, raw)?),                 // FLOAT8
        // TEXT, VARCHAR, CHAR, NAME, UNKNOWN
        25 | 1043 | 1042 | 19 | 705 => Value::Text(String::from_sql(ty, raw)?),
        // JSON, JSONB
        114 | 3802 => Value::Json(JsonValue::from_sql(ty, raw)?),
        1082 => Value::Date(chrono::NaiveDate::from_sql(ty, raw)?.to_string()),
        1083 => Value::Text(chrono::NaiveTime::from_sql(ty, raw)?.to_string()),
        1114 => Value::DateTime(
            chrono::NaiveDateTime::from_sql(ty, raw)?.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
        ),
        1184 => Value::DateTime(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?.to_rfc3339()),
        2950 => Value::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
        17 => Value::from_bytes(raw),                                  // BYTEA
        1700 => Value::Text(decode_numeric(raw).ok_or("malformed numeric value")?),
        1186 => Value::Text(decode_interval(raw).ok_or("malformed interval value")?),
        // INET, CIDR
        869 | 650 => Value::Text(decode_inet(raw).ok_or("malformed network address")?),
        // MACADDR, MACADDR8
        829 | 774 => Value::Text(decode_macaddr(raw).ok_or("malformed mac address")?),
        790 => Value::Text(decode_money(raw).ok_or("malformed money value")?),
        _ => return Err(format!("unsupported column type {}", ty.name()).into()),
    };

    Ok(value)
}

/// Render a binary INTERVAL the way the server's default `postgres` style does,
/// e.g. `1 year 2 mons 3 days 04:05:06.5` or `-1 days +02:00:00`
fn decode_interval(raw: &[u8]) -> Option<String> {
    if raw.len() != 16 {
        return None;
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into().ok()?);
    let days = i32::from_be_bytes(raw[8..12].try_into().ok()?);
    let months = i32::from_be_bytes(raw[12..16].try_into().ok()?);

    let mut out = String::new();
    // A field following a negative one carries an explicit '+'
    let mut after_negative = false;
    for (amount, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if amount == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        if after_negative && amount > 0 {
            out.push('+');
        }
        out.push_str(&format!("{} {}{}", amount, unit, if amount != 1 { "s" } else { "" }));
        after_negative = amount < 0;
    }

    if out.is_empty() || micros != 0 {
        if !out.is_empty() {
            out.push(' ');
        }
        if micros < 0 {
            out.push('-');
        } else if after_negative {
            out.push('+');
        }

        let total = micros.unsigned_abs();
        out.push_str(&format!(
            "{:02}:{:02}:{:02}",
            total / 3_600_000_000,
            total / 60_000_000 % 60,
            total / 1_000_000 % 60
        ));
        let fraction = total % 1_000_000;
        if fraction > 0 {
            out.push('.');
            out.push_str(format!("{:06}", fraction).trim_end_matches('0'));
        }
    }

    Some(out)
}

/// Render binary INET/CIDR as `address/bits`, dropping the mask for a host inet
fn decode_inet(raw: &[u8]) -> Option<String> {
    // family, bits, is_cidr, address length, address bytes
    if raw.len() < 4 || raw[3] as usize != raw.len() - 4 {
        return None;
    }
    let (family, bits, is_cidr, address) = (raw[0], raw[1], raw[2] != 0, &raw[4..]);

    let (address, full_length) = match family {
        2 => (IpAddr::from(<[u8; 4]>::try_from(address).ok()?), 32),
        3 => (IpAddr::from(<[u8; 16]>::try_from(address).ok()?), 128),
        _ => return None,
    };

    if is_cidr || bits != full_length {
        Some(format!("{}/{}", address, bits))
    } else {
        Some(address.to_string())
    }
}

fn decode_macaddr(raw: &[u8]) -> Option<String> {
    if raw.len() != 6 && raw.len() != 8 {
        return None;
    }
    Some(raw.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":"))
}

/// MONEY travels as an int8 count of cents; rendered without locale symbols
fn decode_money(raw: &[u8]) -> Option<String> {
    let cents = i64::from_be_bytes(raw.try_into().ok()?);
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    Some(format!("{}{}.{:02}", sign, cents / 100, cents % 100))
}

/// Render the binary NUMERIC wire format as a decimal string
fn decode_numeric(raw: &[u8]) -> Option<String> {
    if raw.len() < 8 {
        return None;
    }

    let word = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i32;
    let sign = word(4);
    let dscale = word(6) as usize;

    if raw.len() < 8 + ndigits * 2 {
        return None;
    }

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    // base-10000 digit groups, weight counts groups left of the decimal point
    let digit = |position: i32| -> u16 {
        if position >= 0 && (position as usize) < ndigits {
            word(8 + 2 * position as usize)
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for position in 0..=weight {
            if position == 0 {
                out.push_str(&digit(position).to_string());
            } else {
                out.push_str(&format!("{:04}", digit(position)));
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

/// Quote one element of a PostgreSQL array literal
fn push_array_element(out: &mut String, param: &SqlParam) {
    match param {
        SqlParam::Null => out.push_str("NULL"),
        other => {
            out.push('"');
            for ch in text_form(other).chars() {
                if ch == '"' || ch == '\\' {
                    out.push('\\');
                }
                out.push(ch);
            }
            out.push('"');
        }
    }
}

/// Text representation the server parses for any target type
fn text_form(param: &SqlParam) -> String {
    match param {
        SqlParam::Null => String::new(),
        SqlParam::Bool(b) => b.to_string(),
        SqlParam::Int(i) => i.to_string(),
        SqlParam::Float(f) => f.to_string(),
        SqlParam::Text(s) => s.clone(),
        SqlParam::List(items) => {
            let mut out = String::from("{");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_array_element(&mut out, item);
            }
            out.push('}');
            out
        }
    }
}

// Parameters travel in text format and the server coerces them to the
// placeholder's inferred type, so `"42"` binds to an int column and
// `{"a","b"}` to a text[] for `= ANY($n)`.
impl ToSql for SqlParam {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if *self == SqlParam::Null {
            return Ok(IsNull::Yes);
        }
        out.extend_from_slice(text_form(self).as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Append `sslmode` to a DSN unless the DSN already names one
pub fn build_dsn(url: &str, ssl_mode: Option<&str>) -> String {
    let mode = match ssl_mode.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mode) if !url.contains("sslmode=") => mode,
        _ => return url.to_string(),
    };

    if !url.contains("://") {
        // key=value form
        return format!("{} sslmode={}", url.trim_end(), mode);
    }

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}sslmode={}", url, separator, mode)
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(&mut self, config: ConnectorInitConfig) -> AgentResult<()> {
        let dsn = build_dsn(config.require_url()?, config.ssl_mode.as_deref());
        let pg_config: tokio_postgres::Config = dsn.parse()
            .map_err(|e| ConnectorError::ConnectionFailed(format!("Invalid connection url: {}", e)))?;

        let max_size = config.max_connections.unwrap_or(4).max(1) as usize;
        let timeout = config.connect_timeout();

        let manager = Manager::from_config(pg_config, NoTls, ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        // Create connection pool
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .create_timeout(Some(timeout))
            .build()
            .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to create pool: {}", e)))?;

        // Test the connection
        let _client = tokio::time::timeout(timeout, pool.get()).await
            .map_err(|_| ConnectorError::Timeout("Connection timeout".to_string()))?
            .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection: {}", e)))?;

        tracing::debug!(max_connections = max_size, "postgres pool ready");

        self.query_timeout = config.query_timeout();
        self.pool = Some(pool);
        self.connected = true;

        Ok(())
    }

    async fn probe(&self) -> AgentResult<()> {
        let pool = self.pool()?;

        with_deadline(self.query_timeout, "probe", async {
            let client = pool.get().await
                .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection from pool: {}", e)))?;

            let row = client.query_one("SELECT 1", &[]).await
                .map_err(|e| ConnectorError::QueryExecutionFailed(describe_pg_error(&e)))?;
            let answer: i32 = row.try_get(0)
                .map_err(|e| ConnectorError::QueryExecutionFailed(format!("Failed to read probe result: {}", e)))?;

            if answer != 1 {
                return Err(ConnectorError::QueryExecutionFailed(
                    format!("unexpected probe result: {}", answer)
                ).into());
            }
            Ok(())
        }).await
    }

    async fn run(&self, query: &Query) -> AgentResult<ResultSet> {
        let pool = self.pool()?;
        let statement = self.dialect().compile(query)?;

        tracing::debug!(sql = %statement.text, parameters = statement.parameters.len(), "executing statement");

        with_deadline(self.query_timeout, "query", async {
            // Connection goes back to the pool when `client` drops
            let client = pool.get().await
                .map_err(|e| ConnectorError::ConnectionFailed(format!("Failed to get connection from pool: {}", e)))?;

            let params: Vec<&(dyn ToSql + Sync)> = statement.parameters.iter()
                .map(|p| p as &(dyn ToSql + Sync))
                .collect();

            let pg_rows = client.query(statement.text.as_str(), &params).await
                .map_err(|e| ConnectorError::QueryExecutionFailed(describe_pg_error(&e)))?;

            let rows = pg_rows.iter()
                .map(|pg_row| self.convert_pg_row(pg_row))
                .collect::<AgentResult<Vec<_>>>()?;

            Ok(ResultSet::new(rows))
        }).await
    }

    async fn close(&mut self) -> AgentResult<()> {
        if let Some(pool) = self.pool.take() {
            pool.close();
            tracing::debug!("postgres pool closed");
        }
        self.connected = false;
        Ok(())
    }

    fn get_connector_type(&self) -> ConnectorType {
        ConnectorType::PostgreSQL
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Prefer the server's own message over the driver's generic wrapper
fn describe_pg_error(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db_error) => db_error.to_string(),
        None => error.to_string(),
    }
}
