//! SQL text handling
//!
//! Query generation for table browsing and mutations, placeholder scanning
//! for user-written queries, and a small beautifier.

pub mod builder;
pub mod formatter;
pub mod parameters;

pub use builder::{BuiltQuery, JoinKind, JoinSpec, SelectColumn, SelectSpec};
pub use formatter::{format_sql, statement_kind, StatementKind};
pub use parameters::{bind_parameters, scan_parameters, ParameterType, SqlParameter};

/// Quote an identifier to prevent SQL injection
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Schema-qualified, quoted relation name
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Quote a string as a SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("table\"name"), "\"table\"\"name\"");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("public", "users"), "\"public\".\"users\"");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
