use serde::Deserialize;
use crate::utils::{
    types::{Condition, ConditionOperator, Query, SqlParam},
    error::{AgentResult, QueryError},
};

/// Wire shape of a DSL payload before validation
#[derive(Debug, Deserialize)]
struct RawQuery {
    #[serde(default)]
    table: String,
    #[serde(default, alias = "schema")]
    schema_name: Option<String>,
    #[serde(default, alias = "projection")]
    select: Option<String>,
    #[serde(default)]
    conditions: Option<Vec<RawCondition>>,
    #[serde(default, alias = "groupBy")]
    group_by: Option<Vec<String>>,
    #[serde(default)]
    having: Option<Vec<RawCondition>>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    #[serde(default)]
    column: String,
    #[serde(default, rename = "type", alias = "operator")]
    operator: Option<String>,
    #[serde(default)]
    value: Option<SqlParam>,
}

impl Query {
    /// Decode and validate a DSL payload.
    ///
    /// Shape errors (not JSON, not an object, wrong field types) are reported as
    /// `MalformedPayload`; rule violations as `InvalidQuery`. Operator names the
    /// agent does not know pass through and fail later, at compile time.
    pub fn parse(payload: &str) -> AgentResult<Query> {
        let raw: RawQuery = serde_json::from_str(payload)
            .map_err(|e| QueryError::MalformedPayload(e.to_string()))?;

        if raw.table.trim().is_empty() {
            return Err(QueryError::InvalidQuery("table is required".to_string()).into());
        }

        let conditions = convert_conditions("condition", raw.conditions.unwrap_or_default())?;
        let having = convert_conditions("having", raw.having.unwrap_or_default())?;

        let group_by = raw.group_by.unwrap_or_default();
        if let Some(index) = group_by.iter().position(|column| column.trim().is_empty()) {
            return Err(QueryError::InvalidQuery(
                format!("group_by[{}]: column is required", index)
            ).into());
        }

        Ok(Query {
            table: raw.table,
            schema: non_empty(raw.schema_name),
            projection: non_empty(raw.select),
            conditions,
            group_by,
            having,
            limit: raw.limit,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn convert_conditions(clause: &str, raw: Vec<RawCondition>) -> AgentResult<Vec<Condition>> {
    raw.into_iter()
        .enumerate()
        .map(|(index, condition)| convert_condition(clause, index, condition))
        .collect()
}

fn convert_condition(clause: &str, index: usize, raw: RawCondition) -> AgentResult<Condition> {
    let invalid = |reason: String| QueryError::InvalidQuery(format!("{}[{}]: {}", clause, index, reason));

    if raw.column.trim().is_empty() {
        return Err(invalid("column is required".to_string()).into());
    }

    let operator = match raw.operator.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => ConditionOperator::from_name(name),
        _ => return Err(invalid("type is required".to_string()).into()),
    };

    let value = raw.value.filter(|v| *v != SqlParam::Null);

    if operator.takes_value() {
        match (&operator, &value) {
            (_, None) => {
                return Err(invalid(format!("value is required for '{}'", operator)).into());
            }
            (ConditionOperator::In, Some(SqlParam::List(items))) => {
                if items.iter().any(SqlParam::is_list) {
                    return Err(invalid("'in' values must be scalars".to_string()).into());
                }
            }
            (ConditionOperator::In, Some(_)) => {
                return Err(invalid("'in' requires an array value".to_string()).into());
            }
            (_, Some(SqlParam::List(_))) => {
                return Err(invalid(format!("'{}' requires a scalar value", operator)).into());
            }
            _ => {}
        }
    }

    Ok(Condition {
        column: raw.column,
        operator,
        value,
    })
}
