//! Schema types for dynamic database introspection
//!
//! These types represent catalog information discovered at runtime and the
//! request/response bodies exchanged with the browser front-end.

use serde::{Deserialize, Serialize};

/// A schema (namespace) in the connected database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    /// Schema name
    pub name: String,

    /// Number of tables and views in the schema
    pub table_count: u64,
}

/// Kind of relation listed in a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableKind {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    PartitionedTable,
}

impl TableKind {
    /// Map a `pg_class.relkind` code to a table kind
    pub fn from_relkind(relkind: &str) -> Self {
        match relkind {
            "v" => TableKind::View,
            "m" => TableKind::MaterializedView,
            "f" => TableKind::ForeignTable,
            "p" => TableKind::PartitionedTable,
            _ => TableKind::Table,
        }
    }
}

/// Information about a table (for listing)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    /// Schema the table lives in
    pub schema: String,

    /// Table name
    pub name: String,

    /// Relation kind
    pub kind: TableKind,

    /// Planner row estimate (if available)
    pub row_estimate: Option<u64>,

    /// Total on-disk size including indexes and TOAST
    pub size_bytes: Option<u64>,

    /// Table comment
    pub comment: Option<String>,
}

/// Complete schema information for a database table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Schema the table lives in
    pub schema: String,

    /// Name of the table
    pub name: String,

    /// List of columns in the table
    pub columns: Vec<ColumnInfo>,

    /// Primary key column names (if any)
    pub primary_key: Option<Vec<String>>,

    /// Foreign key constraints
    pub foreign_keys: Vec<ForeignKey>,

    /// Index definitions
    pub indexes: Vec<IndexInfo>,

    /// Table comment
    pub comment: Option<String>,
}

impl TableSchema {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Column names in ordinal order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}

/// Information about a single column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name
    pub name: String,

    /// SQL data type as reported by `information_schema` (e.g. "integer", "character varying")
    pub data_type: String,

    /// Underlying type name (e.g. "int4", "_text", or the name of an enum type)
    pub udt_name: String,

    /// Whether the column allows NULL values
    pub nullable: bool,

    /// Default value expression (if any)
    pub default_value: Option<String>,

    /// Whether this column is part of the primary key
    pub is_primary_key: bool,

    /// Whether this is an identity column
    #[serde(default)]
    pub is_identity: bool,

    /// Maximum character length for character types
    pub max_length: Option<i32>,

    /// 1-based position in the table
    #[serde(default)]
    pub ordinal_position: i32,

    /// Column comment
    pub comment: Option<String>,
}

impl ColumnInfo {
    /// Type expression used to cast text-bound parameters into this column's type
    ///
    /// The cast never carries a length: `character` and `bit` alone mean
    /// `char(1)` and `bit(1)` and would truncate the value.
    pub fn cast_type(&self) -> String {
        match self.data_type.as_str() {
            "USER-DEFINED" => crate::sql::quote_identifier(&self.udt_name),
            "ARRAY" => {
                let element = self.udt_name.trim_start_matches('_');
                format!("{}[]", element)
            }
            "character" => "bpchar".to_string(),
            "bit" => "varbit".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the database fills this column when no value is supplied
    pub fn is_generated(&self) -> bool {
        self.is_identity
            || self
                .default_value
                .as_deref()
                .map(|default| default.contains("nextval("))
                .unwrap_or(false)
    }
}

/// Foreign key constraint information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    /// Constraint name
    pub constraint_name: String,

    /// Column name in this table
    pub column: String,

    /// Referenced schema name
    pub references_schema: String,

    /// Referenced table name
    pub references_table: String,

    /// Referenced column name
    pub references_column: String,
}

/// A foreign key edge between two tables, used to draw ER diagrams
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Schema of the referencing table
    pub schema: String,

    /// Referencing table
    pub table: String,

    /// The constraint itself
    #[serde(flatten)]
    pub foreign_key: ForeignKey,
}

/// Index information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    /// Index name
    pub name: String,

    /// Columns included in the index, in key order
    pub columns: Vec<String>,

    /// Whether the index enforces uniqueness
    pub unique: bool,

    /// Whether the index backs the primary key
    #[serde(default)]
    pub primary: bool,

    /// Access method (btree, hash, gin, ...)
    pub method: String,

    /// Full `CREATE INDEX` definition
    pub definition: String,
}

/// Comparison applied by a filter rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Whether the operator compares against a user value
    pub fn needs_value(self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

/// A single column/operator/value tuple used to build a WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Column to filter on
    pub column: String,

    /// Comparison operator
    pub operator: FilterOperator,

    /// Comparison value; ignored by `isNull`/`isNotNull`
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// How multiple filter rules are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    #[default]
    And,
    Or,
}

/// Sort order for row queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortRule {
    /// Column to sort by
    pub column: String,

    /// Direction
    #[serde(default)]
    pub direction: SortOrder,
}

/// Query parameters for fetching rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowQuery {
    /// Starting offset for pagination
    #[serde(default)]
    pub offset: u64,

    /// Maximum number of rows to return; the server default applies when absent
    #[serde(default)]
    pub limit: Option<u64>,

    /// Single column to sort by (query-string form)
    pub sort_by: Option<String>,

    /// Sort order for `sort_by`
    pub sort_order: Option<SortOrder>,

    /// Multi-column sort (JSON body form)
    #[serde(default)]
    pub sort: Vec<SortRule>,

    /// Filter rules
    #[serde(default)]
    pub filters: Vec<FilterRule>,

    /// How filters are combined
    #[serde(default)]
    pub filter_mode: FilterMode,
}

impl RowQuery {
    /// All sort terms, with the single `sort_by` column first
    pub fn sort_rules(&self) -> Vec<SortRule> {
        let mut rules = Vec::with_capacity(self.sort.len() + 1);
        if let Some(column) = &self.sort_by {
            rules.push(SortRule {
                column: column.clone(),
                direction: self.sort_order.unwrap_or_default(),
            });
        }
        rules.extend(self.sort.iter().cloned());
        rules
    }
}

/// Query-string form of a row request: `?offset=0&limit=50&sortBy=id&sortOrder=descending&search=ann`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowQueryParams {
    #[serde(default)]
    pub offset: u64,
    pub limit: Option<u64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// JSON-encoded `Vec<FilterRule>`
    pub filters: Option<String>,
    pub filter_mode: Option<FilterMode>,
}

impl RowQueryParams {
    /// Convert into a [`RowQuery`], decoding the JSON filter list
    pub fn into_row_query(self) -> Result<RowQuery, serde_json::Error> {
        let filters = match self.filters.as_deref() {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };
        Ok(RowQuery {
            offset: self.offset,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            sort: Vec::new(),
            filters,
            filter_mode: self.filter_mode.unwrap_or_default(),
        })
    }
}

/// Response containing table rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowsResponse {
    /// The rows returned
    pub rows: Vec<serde_json::Value>,

    /// Column names in the result
    pub columns: Vec<String>,

    /// Total number of rows in the table (with filters applied)
    pub total: u64,

    /// Current offset
    pub offset: u64,

    /// Limit used for this query
    pub limit: u64,

    /// Whether there are more rows available
    pub has_more: bool,
}

/// Response for row count queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    /// Total number of rows
    pub count: u64,
}

/// Request to execute a raw SQL query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// SQL query to execute
    pub sql: String,

    /// Values for `:name`, `$name` and `?` placeholders
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Result from executing a query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Column names in the result
    pub columns: Vec<String>,

    /// Rows returned (empty for statements without a result set)
    pub rows: Vec<serde_json::Value>,

    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    pub affected_rows: u64,

    /// Query execution time in milliseconds
    pub execution_time_milliseconds: u64,

    /// Error message if the query failed
    pub error: Option<String>,
}

impl QueryResult {
    /// A failed execution carrying only the error message
    pub fn failure(error: impl Into<String>, execution_time_milliseconds: u64) -> Self {
        Self {
            columns: vec![],
            rows: vec![],
            affected_rows: 0,
            execution_time_milliseconds,
            error: Some(error.into()),
        }
    }
}

/// Identifies rows by primary key (or any unique column set)
pub type RowKey = serde_json::Map<String, serde_json::Value>;

/// Body for inserting a row
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRowRequest {
    /// Column values; omitted columns take their defaults
    #[serde(default)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// Body for updating one row
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRowRequest {
    /// Key identifying the row
    pub key: RowKey,

    /// Columns to change
    pub values: serde_json::Map<String, serde_json::Value>,
}

/// Body for deleting rows
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRowsRequest {
    /// One key per row to delete
    pub keys: Vec<RowKey>,
}

/// Outcome of a mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    /// Number of rows affected
    pub affected_rows: u64,

    /// Rows as stored after the change (from `RETURNING *`)
    pub rows: Vec<serde_json::Value>,
}

/// A table or column matching a search term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// What matched
    pub kind: SearchHitKind,

    /// Schema of the table
    pub schema: String,

    /// Table name
    pub table: String,

    /// Column name for column hits
    pub column: Option<String>,

    /// Column data type for column hits
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchHitKind {
    Table,
    Column,
}

/// Usage counters from `pg_stat_user_tables`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatistics {
    pub schema: String,
    pub table: String,
    pub sequential_scans: i64,
    pub index_scans: i64,
    pub live_rows: i64,
}

/// Response from listing tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablesResponse {
    /// List of tables
    pub tables: Vec<TableInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(data_type: &str, udt_name: &str) -> ColumnInfo {
        ColumnInfo {
            name: "c".to_string(),
            data_type: data_type.to_string(),
            udt_name: udt_name.to_string(),
            nullable: true,
            default_value: None,
            is_primary_key: false,
            is_identity: false,
            max_length: None,
            ordinal_position: 1,
            comment: None,
        }
    }

    #[test]
    fn test_cast_type() {
        assert_eq!(column("integer", "int4").cast_type(), "integer");
        assert_eq!(column("USER-DEFINED", "mood").cast_type(), "\"mood\"");
        assert_eq!(column("ARRAY", "_text").cast_type(), "text[]");
    }

    #[test]
    fn test_generated_columns() {
        let mut serial = column("integer", "int4");
        serial.default_value = Some("nextval('users_id_seq'::regclass)".to_string());
        assert!(serial.is_generated());
        assert!(!column("text", "text").is_generated());
    }

    #[test]
    fn test_sort_rules_put_sort_by_first() {
        let query = RowQuery {
            sort_by: Some("name".to_string()),
            sort_order: Some(SortOrder::Descending),
            sort: vec![SortRule {
                column: "id".to_string(),
                direction: SortOrder::Ascending,
            }],
            ..Default::default()
        };
        let rules = query.sort_rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].column, "name");
        assert_eq!(rules[0].direction, SortOrder::Descending);
    }

    #[test]
    fn test_row_query_params_decode_filters() {
        let params = RowQueryParams {
            filters: Some(r#"[{"column":"age","operator":"greaterThan","value":30}]"#.to_string()),
            ..Default::default()
        };
        let query = params.into_row_query().unwrap();
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].operator, FilterOperator::GreaterThan);
    }

    #[test]
    fn test_filter_rule_deserializes_camel_case() {
        let rule: FilterRule =
            serde_json::from_str(r#"{"column":"email","operator":"isNotNull"}"#).unwrap();
        assert_eq!(rule.operator, FilterOperator::IsNotNull);
        assert!(rule.value.is_none());
        assert!(!rule.operator.needs_value());
    }
}
