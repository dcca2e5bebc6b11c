//! Database provider trait
//!
//! This trait defines the interface a database backend must provide, plus the
//! factory that opens one provider per saved connection.

use crate::connections::ConnectionConfig;
use crate::schema::{
    CountResponse, MutationResult, QueryResult, Relationship, RowKey, RowQuery, RowsResponse,
    SchemaInfo, SearchHit, TableInfo, TableSchema, TableStatistics,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Database provider trait for schema discovery and data access
///
/// Implementations of this trait provide database-specific logic for
/// discovering schema information, fetching data and applying row edits.
#[async_trait]
pub trait DatabaseProvider: Send + Sync + 'static {
    /// Check that the server answers
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Server version string as reported by the server
    async fn server_version(&self) -> Result<String, DatabaseError>;

    /// List user schemas with their table counts
    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, DatabaseError>;

    /// List tables, views and materialized views in a schema
    async fn list_tables(&self, schema: &str) -> Result<Vec<TableInfo>, DatabaseError>;

    /// Get schema information for a specific table
    ///
    /// # Arguments
    ///
    /// * `schema` - Schema the table lives in
    /// * `table` - Name of the table
    ///
    /// # Returns
    ///
    /// Complete schema information including columns, keys, and indexes
    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema, DatabaseError>;

    /// Every foreign key edge whose referencing table is in `schema`
    async fn list_relationships(&self, schema: &str) -> Result<Vec<Relationship>, DatabaseError>;

    /// Fetch rows with pagination, sorting, and filtering
    ///
    /// `table` is the already introspected target, usually from the metadata
    /// cache. `query.limit` is taken as given; callers clamp it to their page
    /// size.
    async fn get_rows(
        &self,
        table: &TableSchema,
        query: RowQuery,
    ) -> Result<RowsResponse, DatabaseError>;

    /// Get total row count for a table (with optional filters)
    async fn count_rows(
        &self,
        table: &TableSchema,
        query: &RowQuery,
    ) -> Result<CountResponse, DatabaseError>;

    /// Execute a raw SQL statement with native `$n` parameters
    ///
    /// # Security Warning
    ///
    /// This allows executing any SQL statement, including DDL. The caller is
    /// trusted with the connection's credentials.
    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError>;

    /// Insert one row, returning it as stored
    async fn insert_row(
        &self,
        schema: &str,
        table: &str,
        values: &Map<String, Value>,
    ) -> Result<MutationResult, DatabaseError>;

    /// Update the row identified by `key`
    async fn update_row(
        &self,
        schema: &str,
        table: &str,
        key: &RowKey,
        values: &Map<String, Value>,
    ) -> Result<MutationResult, DatabaseError>;

    /// Delete every row identified by `keys` in one transaction
    async fn delete_rows(
        &self,
        schema: &str,
        table: &str,
        keys: &[RowKey],
    ) -> Result<MutationResult, DatabaseError>;

    /// Tables and columns whose name contains `term`
    async fn search(&self, term: &str, limit: u64) -> Result<Vec<SearchHit>, DatabaseError>;

    /// Scan counters for the tables of a schema
    async fn table_statistics(&self, schema: &str) -> Result<Vec<TableStatistics>, DatabaseError>;

    /// Up to `limit` non-null values of one column
    async fn column_sample(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: u64,
    ) -> Result<Vec<Value>, DatabaseError>;
}

/// Opens providers for saved connections
#[async_trait]
pub trait ProviderFactory: Send + Sync + 'static {
    /// Provider type produced by this factory
    type Provider: DatabaseProvider;

    /// Create a provider for `config`; may connect lazily
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Provider, DatabaseError>;
}

/// Database error type
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Generic database error
    #[error("Database error: {0}")]
    Query(String),

    /// Table not found
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Invalid column name
    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    /// Query timeout
    #[error("Query timeout exceeded")]
    Timeout,

    /// Result set too large
    #[error("Result set too large (max {0} rows)")]
    TooManyRows(u64),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The server could not be reached or refused the credentials
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request cannot be turned into a statement
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => DatabaseError::Connection(error.to_string()),
            sqlx::Error::Database(ref database_error)
                if database_error.code().as_deref() == Some("28P01") =>
            {
                DatabaseError::Connection(error.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DatabaseError::Serialization(error.to_string())
            }
            other => DatabaseError::Query(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_connection_errors() {
        assert!(matches!(
            DatabaseError::from(sqlx::Error::PoolTimedOut),
            DatabaseError::Connection(_)
        ));
        assert!(matches!(
            DatabaseError::from(sqlx::Error::RowNotFound),
            DatabaseError::Query(_)
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DatabaseError::TooManyRows(10).to_string(),
            "Result set too large (max 10 rows)"
        );
        assert_eq!(
            DatabaseError::InvalidColumn("nope".to_string()).to_string(),
            "Invalid column: nope"
        );
    }
}
