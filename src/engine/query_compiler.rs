use crate::utils::{
    types::{CompiledStatement, Condition, ConditionOperator, ConnectorType, Query, SqlParam},
    error::{AgentResult, QueryError},
};

/// How a dialect writes bind markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// The same marker for every parameter, e.g. `?`
    Positional(&'static str),
    /// A prefix followed by the 1-based parameter index, e.g. `$1`
    Numbered(&'static str),
}

/// How a dialect binds the list of an `in` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InListPolicy {
    /// `column = ANY(<p>)` with the whole list bound as one array parameter
    BindArray,
    /// `column IN (<p>, <p>, ...)` with one scalar parameter per element
    Expand,
}

/// Backend-specific rendering rules for compiled statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    pub name: &'static str,
    pub placeholders: PlaceholderStyle,
    pub in_list: InListPolicy,
}

impl SqlDialect {
    pub const POSTGRES: SqlDialect = SqlDialect {
        name: "postgres",
        placeholders: PlaceholderStyle::Numbered("$"),
        in_list: InListPolicy::BindArray,
    };

    pub const MYSQL: SqlDialect = SqlDialect {
        name: "mysql",
        placeholders: PlaceholderStyle::Positional("?"),
        in_list: InListPolicy::Expand,
    };

    /// Dialect spoken by a connector type; the mock backend renders like PostgreSQL
    pub fn for_connector(connector_type: ConnectorType) -> SqlDialect {
        match connector_type {
            ConnectorType::MySQL => SqlDialect::MYSQL,
            ConnectorType::PostgreSQL | ConnectorType::Mock => SqlDialect::POSTGRES,
        }
    }

    pub fn from_name(name: &str) -> Option<SqlDialect> {
        match name.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(SqlDialect::POSTGRES),
            "mysql" => Some(SqlDialect::MYSQL),
            _ => None,
        }
    }

    /// Render `query` into SQL text plus parameters in WHERE, HAVING, LIMIT order.
    ///
    /// Identifiers (table, schema, projection, columns) are written verbatim.
    pub fn compile(&self, query: &Query) -> AgentResult<CompiledStatement> {
        if query.table.trim().is_empty() {
            return Err(QueryError::InvalidQuery("table is required".to_string()).into());
        }

        let mut builder = StatementBuilder::new(self);

        let projection = query.projection.as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("*");
        builder.push(&format!("SELECT {}", projection));

        match query.schema.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(schema) => builder.push(&format!(" FROM {}.{}", schema, query.table)),
            None => builder.push(&format!(" FROM {}", query.table)),
        }

        if !query.conditions.is_empty() {
            let clauses = builder.render_conditions(&query.conditions)?;
            builder.push(&format!(" WHERE {}", clauses));
        }

        if !query.group_by.is_empty() {
            builder.push(&format!(" GROUP BY {}", query.group_by.join(", ")));
        }

        if !query.having.is_empty() {
            let clauses = builder.render_conditions(&query.having)?;
            builder.push(&format!(" HAVING {}", clauses));
        }

        if let Some(limit) = query.limit.filter(|limit| *limit > 0) {
            let placeholder = builder.bind(SqlParam::Int(limit));
            builder.push(&format!(" LIMIT {}", placeholder));
        }

        Ok(builder.finish())
    }
}

/// Accumulates statement text and threads the parameter index
struct StatementBuilder<'a> {
    dialect: &'a SqlDialect,
    text: String,
    parameters: Vec<SqlParam>,
}

impl<'a> StatementBuilder<'a> {
    fn new(dialect: &'a SqlDialect) -> Self {
        Self {
            dialect,
            text: String::new(),
            parameters: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    /// Record a parameter and return the marker that refers to it
    fn bind(&mut self, value: SqlParam) -> String {
        self.parameters.push(value);
        match self.dialect.placeholders {
            PlaceholderStyle::Positional(marker) => marker.to_string(),
            PlaceholderStyle::Numbered(prefix) => format!("{}{}", prefix, self.parameters.len()),
        }
    }

    fn render_conditions(&mut self, conditions: &[Condition]) -> AgentResult<String> {
        let clauses = conditions.iter()
            .map(|condition| self.render_condition(condition))
            .collect::<AgentResult<Vec<_>>>()?;
        Ok(clauses.join(" AND "))
    }

    fn render_condition(&mut self, condition: &Condition) -> AgentResult<String> {
        let operator_sql = match &condition.operator {
            ConditionOperator::Equal => "=",
            ConditionOperator::NotEqual => "!=",
            ConditionOperator::GreaterThan => ">",
            ConditionOperator::GreaterOrEqual => ">=",
            ConditionOperator::LessThan => "<",
            ConditionOperator::LessOrEqual => "<=",
            ConditionOperator::Like => "LIKE",
            ConditionOperator::IsNull => return Ok(format!("{} IS NULL", condition.column)),
            ConditionOperator::IsNotNull => return Ok(format!("{} IS NOT NULL", condition.column)),
            ConditionOperator::In => return self.render_in(condition),
            ConditionOperator::Unsupported(name) => {
                return Err(QueryError::UnsupportedOperator(name.clone()).into());
            }
        };

        let value = required_value(condition)?;
        let placeholder = self.bind(value.clone());
        Ok(format!("{} {} {}", condition.column, operator_sql, placeholder))
    }

    fn render_in(&mut self, condition: &Condition) -> AgentResult<String> {
        let items = match required_value(condition)? {
            SqlParam::List(items) => items,
            _ => {
                return Err(QueryError::InvalidQuery(
                    format!("'in' on column '{}' requires an array value", condition.column)
                ).into());
            }
        };

        match self.dialect.in_list {
            InListPolicy::BindArray => {
                let placeholder = self.bind(SqlParam::List(items.clone()));
                Ok(format!("{} = ANY({})", condition.column, placeholder))
            }
            InListPolicy::Expand if items.is_empty() => Ok("1 = 0".to_string()),
            InListPolicy::Expand => {
                let placeholders: Vec<String> = items.iter()
                    .map(|item| self.bind(item.clone()))
                    .collect();
                Ok(format!("{} IN ({})", condition.column, placeholders.join(", ")))
            }
        }
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement {
            text: self.text,
            parameters: self.parameters,
        }
    }
}

fn required_value(condition: &Condition) -> AgentResult<&SqlParam> {
    match &condition.value {
        Some(SqlParam::Null) | None => Err(QueryError::InvalidQuery(
            format!("value is required for '{}' on column '{}'", condition.operator, condition.column)
        ).into()),
        Some(value) => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::AgentError;

    fn compile(dialect: SqlDialect, payload: &str) -> AgentResult<CompiledStatement> {
        let query = Query::parse(payload)?;
        dialect.compile(&query)
    }

    /// Numbers of every `$n` marker in the order they appear
    fn numbered_markers(text: &str) -> Vec<usize> {
        text.split('$')
            .skip(1)
            .map(|rest| {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_simple_select_positional() {
        let statement = compile(SqlDialect::MYSQL, r#"{"table":"users"}"#).unwrap();

        assert_eq!(statement.text, "SELECT * FROM users");
        assert!(statement.parameters.is_empty());
    }

    #[test]
    fn test_filtered_select_numbered() {
        let statement = compile(
            SqlDialect::POSTGRES,
            r#"{"table":"users","conditions":[{"column":"status","type":"equal","value":"active"}]}"#,
        ).unwrap();

        assert_eq!(statement.text, "SELECT * FROM users WHERE status = $1");
        assert_eq!(statement.parameters, vec![SqlParam::from("active")]);
    }

    #[test]
    fn test_compound_with_limit() {
        let payload = r#"{"table":"orders","conditions":[
            {"column":"status","type":"equal","value":"completed"},
            {"column":"total","type":"greater_than","value":100}
        ],"limit":50}"#;

        let statement = compile(SqlDialect::POSTGRES, payload).unwrap();
        assert_eq!(statement.text, "SELECT * FROM orders WHERE status = $1 AND total > $2 LIMIT $3");
        assert_eq!(statement.parameters, vec![SqlParam::from("completed"), SqlParam::from(100), SqlParam::from(50)]);

        let statement = compile(SqlDialect::MYSQL, payload).unwrap();
        assert_eq!(statement.text, "SELECT * FROM orders WHERE status = ? AND total > ? LIMIT ?");
        assert_eq!(statement.parameters, vec![SqlParam::from("completed"), SqlParam::from(100), SqlParam::from(50)]);
    }

    #[test]
    fn test_unsupported_operator() {
        let result = compile(SqlDialect::POSTGRES, r#"{"table":"t","conditions":[{"column":"c","type":"bogus"}]}"#);

        match result {
            Err(AgentError::Query(QueryError::UnsupportedOperator(name))) => assert_eq!(name, "bogus"),
            other => panic!("Expected UnsupportedOperator, got {:?}", other),
        }
    }

    #[test]
    fn test_every_comparison_operator() {
        let cases = [
            ("equal", "="),
            ("not_equal", "!="),
            ("greater_than", ">"),
            ("greater_or_equal", ">="),
            ("less_than", "<"),
            ("less_or_equal", "<="),
            ("like", "LIKE"),
        ];

        for (name, sql) in cases {
            let payload = format!(r#"{{"table":"t","conditions":[{{"column":"c","type":"{}","value":"v"}}]}}"#, name);
            let statement = compile(SqlDialect::MYSQL, &payload).unwrap();
            assert_eq!(statement.text, format!("SELECT * FROM t WHERE c {} ?", sql));
            assert_eq!(statement.parameters.len(), 1);
        }
    }

    #[test]
    fn test_null_checks_bind_nothing() {
        let statement = compile(SqlDialect::POSTGRES, r#"{"table":"users","conditions":[
            {"column":"deleted_at","type":"is_null"},
            {"column":"email","type":"is_not_null"},
            {"column":"age","type":"less_than","value":30}
        ]}"#).unwrap();

        assert_eq!(
            statement.text,
            "SELECT * FROM users WHERE deleted_at IS NULL AND email IS NOT NULL AND age < $1"
        );
        assert_eq!(statement.parameters, vec![SqlParam::from(30)]);
    }

    #[test]
    fn test_schema_projection_group_by_and_having() {
        let statement = compile(SqlDialect::POSTGRES, r#"{
            "schema_name":"sales",
            "table":"orders",
            "select":"region, COUNT(*) AS n",
            "conditions":[{"column":"status","type":"equal","value":"paid"}],
            "group_by":["region","channel"],
            "having":[{"column":"COUNT(*)","type":"greater_or_equal","value":5}],
            "limit":10
        }"#).unwrap();

        assert_eq!(
            statement.text,
            "SELECT region, COUNT(*) AS n FROM sales.orders WHERE status = $1 \
             GROUP BY region, channel HAVING COUNT(*) >= $2 LIMIT $3"
        );
        assert_eq!(statement.parameters, vec![SqlParam::from("paid"), SqlParam::from(5), SqlParam::from(10)]);
    }

    #[test]
    fn test_in_binds_array_for_postgres() {
        let statement = compile(SqlDialect::POSTGRES, r#"{"table":"users","conditions":[
            {"column":"id","type":"in","value":[1,2,3]},
            {"column":"name","type":"like","value":"a%"}
        ]}"#).unwrap();

        assert_eq!(statement.text, "SELECT * FROM users WHERE id = ANY($1) AND name LIKE $2");
        assert_eq!(statement.parameters, vec![SqlParam::from(vec![1, 2, 3]), SqlParam::from("a%")]);
    }

    #[test]
    fn test_in_expands_for_mysql() {
        let statement = compile(SqlDialect::MYSQL, r#"{"table":"users","conditions":[
            {"column":"id","type":"in","value":[1,2,3]},
            {"column":"name","type":"like","value":"a%"}
        ]}"#).unwrap();

        assert_eq!(statement.text, "SELECT * FROM users WHERE id IN (?, ?, ?) AND name LIKE ?");
        assert_eq!(
            statement.parameters,
            vec![SqlParam::from(1), SqlParam::from(2), SqlParam::from(3), SqlParam::from("a%")]
        );
    }

    #[test]
    fn test_empty_in_list_for_mysql_is_always_false() {
        let statement = compile(SqlDialect::MYSQL, r#"{"table":"users","conditions":[
            {"column":"id","type":"in","value":[]}
        ],"limit":5}"#).unwrap();

        assert_eq!(statement.text, "SELECT * FROM users WHERE 1 = 0 LIMIT ?");
        assert_eq!(statement.parameters, vec![SqlParam::from(5)]);
    }

    #[test]
    fn test_boundaries_omit_clauses() {
        let statement = compile(
            SqlDialect::POSTGRES,
            r#"{"table":"users","conditions":[],"group_by":[],"having":[],"limit":0}"#,
        ).unwrap();
        assert_eq!(statement.text, "SELECT * FROM users");

        let statement = compile(SqlDialect::POSTGRES, r#"{"table":"users","limit":-3}"#).unwrap();
        assert_eq!(statement.text, "SELECT * FROM users");
        assert!(statement.parameters.is_empty());
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let query = Query::parse(r#"{"table":"orders","conditions":[
            {"column":"id","type":"in","value":[4,5]},
            {"column":"total","type":"greater_than","value":1.5}
        ],"group_by":["id"],"having":[{"column":"SUM(total)","type":"less_than","value":9}],"limit":3}"#).unwrap();

        for dialect in [SqlDialect::POSTGRES, SqlDialect::MYSQL] {
            let first = dialect.compile(&query).unwrap();
            let second = dialect.compile(&query).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_numbered_placeholders_have_no_gaps() {
        let query = Query::parse(r#"{"table":"events","conditions":[
            {"column":"a","type":"equal","value":1},
            {"column":"b","type":"is_null"},
            {"column":"c","type":"in","value":["x","y"]},
            {"column":"d","type":"not_equal","value":"z"},
            {"column":"e","type":"is_not_null"}
        ],"group_by":["a"],"having":[
            {"column":"COUNT(*)","type":"greater_than","value":1},
            {"column":"MAX(d)","type":"is_not_null"}
        ],"limit":20}"#).unwrap();

        let statement = SqlDialect::POSTGRES.compile(&query).unwrap();
        let markers = numbered_markers(&statement.text);

        assert_eq!(markers, (1..=statement.parameters.len()).collect::<Vec<_>>());
        assert_eq!(statement.parameters.len(), 5);
        assert_eq!(statement.parameters.last(), Some(&SqlParam::Int(20)));
    }

    #[test]
    fn test_positional_marker_count_matches_parameters() {
        let query = Query::parse(r#"{"table":"events","conditions":[
            {"column":"c","type":"in","value":["x","y","z"]},
            {"column":"d","type":"equal","value":true}
        ],"having":[{"column":"COUNT(*)","type":"greater_than","value":1}],"limit":2}"#).unwrap();

        let statement = SqlDialect::MYSQL.compile(&query).unwrap();
        assert_eq!(statement.text.matches('?').count(), statement.parameters.len());
        assert_eq!(statement.parameters.len(), 6);
    }

    #[test]
    fn test_programmatic_query_without_value_is_rejected() {
        let query = Query::new("users")
            .with_condition(Condition::new("id", ConditionOperator::Equal, None));

        match SqlDialect::POSTGRES.compile(&query) {
            Err(AgentError::Query(QueryError::InvalidQuery(msg))) => assert!(msg.contains("'equal'")),
            other => panic!("Expected InvalidQuery, got {:?}", other),
        }
    }

    #[test]
    fn test_dialect_lookup() {
        assert_eq!(SqlDialect::for_connector(ConnectorType::MySQL), SqlDialect::MYSQL);
        assert_eq!(SqlDialect::for_connector(ConnectorType::PostgreSQL), SqlDialect::POSTGRES);
        assert_eq!(SqlDialect::from_name("PostgreSQL"), Some(SqlDialect::POSTGRES));
        assert_eq!(SqlDialect::from_name("oracle"), None);
    }
}
