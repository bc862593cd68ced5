use colored::*;
use serde_json::json;
use crate::cli::cli_args::OutputFormat;
use crate::engine::{PlaceholderStyle, SqlDialect};
use crate::utils::types::{CompiledStatement, SqlParam};

/// Formats command results for CLI output
pub struct OutputFormatter;

impl OutputFormatter {
    /// Format a compiled statement according to the specified format
    pub fn format_statement(statement: &CompiledStatement, dialect: &SqlDialect, format: &OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(statement, dialect),
            OutputFormat::Json => Self::format_json(statement, dialect),
        }
    }

    /// SQL text followed by a table of bound parameters
    fn format_table(statement: &CompiledStatement, dialect: &SqlDialect) -> String {
        let mut output = String::new();
        output.push_str(&format!("{} {}\n", "SQL:".bold(), statement.text.cyan()));

        if statement.parameters.is_empty() {
            output.push_str(&format!("{}\n", "No parameters.".dimmed()));
            return output;
        }

        let headers = ["#", "placeholder", "value"];
        let rows: Vec<[String; 3]> = statement.parameters.iter()
            .enumerate()
            .map(|(i, param)| [
                (i + 1).to_string(),
                Self::placeholder(dialect, i + 1),
                Self::param_to_string(param),
            ])
            .collect();

        // Calculate column widths
        let mut col_widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                col_widths[i] = col_widths[i].max(cell.chars().count());
            }
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output.push('|');
        for (i, header) in headers.iter().enumerate() {
            output.push_str(&format!(" {} |", Self::pad(&header.bold().cyan().to_string(), header.len(), col_widths[i])));
        }
        output.push('\n');
        output.push_str(&Self::format_table_separator(&col_widths, false));

        for (row, param) in rows.iter().zip(&statement.parameters) {
            output.push('|');
            for (i, cell) in row.iter().enumerate() {
                let colored = if i == 2 { Self::colorize(param, cell) } else { cell.normal() };
                output.push_str(&format!(" {} |", Self::pad(&colored.to_string(), cell.chars().count(), col_widths[i])));
            }
            output.push('\n');
        }

        output.push_str(&Self::format_table_separator(&col_widths, true));
        output.push_str(&format!(
            "\n{} {}\n",
            statement.parameters.len().to_string().green().bold(),
            if statement.parameters.len() == 1 { "parameter" } else { "parameters" }
        ));

        output
    }

    /// Right-pad text whose visible width is `visible`, ignoring color escapes
    fn pad(text: &str, visible: usize, width: usize) -> String {
        format!("{}{}", text, " ".repeat(width.saturating_sub(visible)))
    }

    /// Format table separator line
    fn format_table_separator(col_widths: &[usize], is_border: bool) -> String {
        let edge = if is_border { '+' } else { '|' };
        let mut separator = String::new();

        separator.push(edge);
        for &width in col_widths {
            separator.push_str(&"-".repeat(width + 2));
            separator.push(edge);
        }

        separator.push('\n');
        separator
    }

    fn format_json(statement: &CompiledStatement, dialect: &SqlDialect) -> String {
        let output = json!({
            "dialect": dialect.name,
            "text": statement.text,
            "parameters": statement.parameters,
        });

        serde_json::to_string_pretty(&output).unwrap_or_else(|_| "{}".to_string())
    }

    fn placeholder(dialect: &SqlDialect, index: usize) -> String {
        match dialect.placeholders {
            PlaceholderStyle::Positional(marker) => marker.to_string(),
            PlaceholderStyle::Numbered(prefix) => format!("{}{}", prefix, index),
        }
    }

    /// Convert a parameter to a display string
    fn param_to_string(param: &SqlParam) -> String {
        match param {
            SqlParam::Null => "NULL".to_string(),
            SqlParam::Text(s) => format!("'{}'", s),
            SqlParam::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::param_to_string).collect();
                format!("[{}]", inner.join(", "))
            }
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }

    fn colorize(param: &SqlParam, text: &str) -> ColoredString {
        match param {
            SqlParam::Text(_) => text.normal(),
            SqlParam::Int(_) | SqlParam::Float(_) => text.blue(),
            SqlParam::Bool(true) => text.green(),
            SqlParam::Bool(false) => text.red(),
            SqlParam::List(_) => text.magenta(),
            SqlParam::Null => text.dimmed(),
        }
    }

    /// Format error message for CLI display
    pub fn format_error(error: &crate::utils::error::AgentError) -> String {
        format!("{} {}", "Error:".red().bold(), error.to_string().red())
    }

    /// Format success message for CLI display
    pub fn format_success(message: &str) -> String {
        format!("{} {}", "Success:".green().bold(), message)
    }

    /// Format info message for CLI display
    pub fn format_info(message: &str) -> String {
        format!("{} {}", "Info:".blue().bold(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;

    fn statement() -> CompiledStatement {
        CompiledStatement {
            text: "SELECT * FROM orders WHERE status = $1 AND id = ANY($2) LIMIT $3".to_string(),
            parameters: vec!["completed".into(), vec![1, 2].into(), SqlParam::Int(50)],
        }
    }

    #[test]
    fn test_format_table() {
        colored::control::set_override(false);
        let output = OutputFormatter::format_statement(&statement(), &SqlDialect::POSTGRES, &OutputFormat::Table);

        assert!(output.starts_with("SQL: SELECT * FROM orders"));
        assert!(output.contains("| 1 | $1          | 'completed' |"));
        assert!(output.contains("| 2 | $2          | [1, 2]      |"));
        assert!(output.contains("3 parameters"));
    }

    #[test]
    fn test_format_table_without_parameters() {
        colored::control::set_override(false);
        let statement = CompiledStatement { text: "SELECT * FROM users".to_string(), parameters: vec![] };
        let output = OutputFormatter::format_statement(&statement, &SqlDialect::MYSQL, &OutputFormat::Table);

        assert!(output.contains("No parameters."));
    }

    #[test]
    fn test_format_json() {
        let output = OutputFormatter::format_statement(&statement(), &SqlDialect::POSTGRES, &OutputFormat::Json);
        let parsed: JsonValue = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["dialect"], "postgres");
        assert_eq!(parsed["parameters"], json!(["completed", [1, 2], 50]));
    }

    #[test]
    fn test_positional_placeholder_column() {
        assert_eq!(OutputFormatter::placeholder(&SqlDialect::MYSQL, 3), "?");
        assert_eq!(OutputFormatter::placeholder(&SqlDialect::POSTGRES, 3), "$3");
    }
}
