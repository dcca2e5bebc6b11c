//! PostgreSQL database provider implementation

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgSslMode, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Executor, PgPool, Row, Statement as _, TypeInfo};
use tracing::{debug, info};

use crate::connections::{ConnectionConfig, SslMode};
use crate::database::arguments::{self, Argument};
use crate::database::traits::{DatabaseError, DatabaseProvider, ProviderFactory};
use crate::options::ViewerOptions;
use crate::schema::{
    ColumnInfo, CountResponse, ForeignKey, IndexInfo, MutationResult, QueryResult, Relationship,
    RowKey, RowQuery, RowsResponse, SchemaInfo, SearchHit, SearchHitKind, TableInfo, TableKind,
    TableSchema, TableStatistics,
};
use crate::sql::builder::{self, BuiltQuery};
use crate::sql::{formatter, qualified_name, quote_identifier};

const USER_SCHEMAS: &str =
    "n.nspname NOT IN ('pg_catalog', 'information_schema') AND n.nspname NOT LIKE 'pg\\_toast%' AND n.nspname NOT LIKE 'pg\\_temp\\_%'";

const LISTED_RELKINDS: &str = "('r', 'v', 'm', 'f', 'p')";

/// Foreign keys with one row per column pair; `$2` NULL means every table
const FOREIGN_KEY_QUERY: &str = r#"
    SELECT
        con.conname::text AS constraint_name,
        c.relname::text AS table_name,
        a.attname::text AS column_name,
        rn.nspname::text AS references_schema,
        rc.relname::text AS references_table,
        ra.attname::text AS references_column
    FROM pg_constraint con
    JOIN pg_class c ON c.oid = con.conrelid
    JOIN pg_namespace n ON n.oid = c.relnamespace
    JOIN pg_class rc ON rc.oid = con.confrelid
    JOIN pg_namespace rn ON rn.oid = rc.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, position)
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
    WHERE con.contype = 'f'
      AND n.nspname = $1
      AND ($2::text IS NULL OR c.relname = $2)
    ORDER BY c.relname, con.conname, k.position
"#;

/// Creates one pooled [`PostgresProvider`] per saved connection
#[derive(Debug, Clone)]
pub struct PostgresFactory {
    max_connections: u32,
    acquire_timeout: Duration,
    query_timeout: Duration,
    max_result_rows: u64,
}

impl PostgresFactory {
    pub fn new(options: &ViewerOptions) -> Self {
        Self {
            max_connections: options.max_connections,
            acquire_timeout: options.acquire_timeout,
            query_timeout: options.query_timeout,
            max_result_rows: options.max_result_rows,
        }
    }

    fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let ssl_mode = match config.ssl_mode {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Allow => PgSslMode::Allow,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        };

        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .ssl_mode(ssl_mode)
            .application_name("pgdesk");
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        options
    }
}

#[async_trait]
impl ProviderFactory for PostgresFactory {
    type Provider = PostgresProvider;

    async fn connect(&self, config: &ConnectionConfig) -> Result<PostgresProvider, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(Self::connect_options(config));

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Opened PostgreSQL pool"
        );

        Ok(PostgresProvider::new(pool, self.query_timeout, self.max_result_rows))
    }
}

/// PostgreSQL database provider
pub struct PostgresProvider {
    pool: PgPool,
    query_timeout: Duration,
    max_result_rows: u64,
}

impl PostgresProvider {
    /// Create a new PostgreSQL provider
    ///
    /// # Arguments
    ///
    /// * `pool` - PostgreSQL connection pool
    /// * `query_timeout` - Upper bound for any single statement
    /// * `max_result_rows` - Raw queries returning more rows fail
    pub fn new(pool: PgPool, query_timeout: Duration, max_result_rows: u64) -> Self {
        Self {
            pool,
            query_timeout,
            max_result_rows,
        }
    }

    /// Run a database future under the query timeout
    async fn timed<T, E, Fut>(&self, future: Fut) -> Result<T, DatabaseError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Into<DatabaseError>,
    {
        match tokio::time::timeout(self.query_timeout, future).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(DatabaseError::Timeout),
        }
    }

    /// Bind text-encoded builder parameters
    fn built(query: &BuiltQuery) -> Query<'_, Postgres, PgArguments> {
        debug!(sql = %query.sql, params = query.params.len(), "Generated SQL");
        query
            .params
            .iter()
            .fold(sqlx::query(&query.sql), |statement, value| statement.bind(value.as_deref()))
    }

    /// Types the server infers for the `$n` placeholders of `sql`, in order
    async fn parameter_types(&self, sql: &str) -> Result<Vec<String>, DatabaseError> {
        let prepared = self.timed(self.pool.prepare(sql)).await?;
        Ok(prepared
            .parameters()
            .and_then(|parameters| parameters.left())
            .map(|types| types.iter().map(|type_info| type_info.name().to_string()).collect())
            .unwrap_or_default())
    }

    /// Convert a PostgreSQL row to a JSON object
    fn row_to_json(row: &PgRow) -> Result<Value, DatabaseError> {
        let mut map = Map::new();

        for (index, column) in row.columns().iter().enumerate() {
            let type_name = column.type_info().name();

            let value: Value = match type_name {
                "BOOL" => {
                    let val: Option<bool> = row.try_get(index)?;
                    val.map(Value::Bool).unwrap_or(Value::Null)
                }
                "INT2" => {
                    let val: Option<i16> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "INT4" => {
                    let val: Option<i32> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "INT8" => {
                    let val: Option<i64> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.into())).unwrap_or(Value::Null)
                }
                "OID" => {
                    let val: Option<sqlx::postgres::types::Oid> = row.try_get(index)?;
                    val.map(|v| Value::Number(v.0.into())).unwrap_or(Value::Null)
                }
                "FLOAT4" => {
                    let val: Option<f32> = row.try_get(index)?;
                    val.and_then(|v| serde_json::Number::from_f64(v as f64))
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "FLOAT8" => {
                    let val: Option<f64> = row.try_get(index)?;
                    val.and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
                "NUMERIC" => {
                    // kept as a string to preserve precision
                    let val: Option<rust_decimal::Decimal> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "TEXT" | "VARCHAR" | "CHAR" | "NAME" | "BPCHAR" | "CITEXT" => {
                    let val: Option<String> = row.try_get(index)?;
                    val.map(Value::String).unwrap_or(Value::Null)
                }
                "BYTEA" => {
                    let val: Option<Vec<u8>> = row.try_get(index)?;
                    val.map(|bytes| Value::String(format!("[BLOB: {} bytes]", bytes.len())))
                        .unwrap_or(Value::Null)
                }
                "TIMESTAMPTZ" => {
                    let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_rfc3339())).unwrap_or(Value::Null)
                }
                "TIMESTAMP" => {
                    let val: Option<chrono::NaiveDateTime> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "DATE" => {
                    let val: Option<chrono::NaiveDate> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "TIME" => {
                    let val: Option<chrono::NaiveTime> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "JSON" | "JSONB" => {
                    let val: Option<Value> = row.try_get(index)?;
                    val.unwrap_or(Value::Null)
                }
                "UUID" => {
                    let val: Option<uuid::Uuid> = row.try_get(index)?;
                    val.map(|v| Value::String(v.to_string())).unwrap_or(Value::Null)
                }
                "TEXT[]" | "VARCHAR[]" | "NAME[]" => {
                    let val: Option<Vec<String>> = row.try_get(index)?;
                    val.map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
                        .unwrap_or(Value::Null)
                }
                "INT4[]" => {
                    let val: Option<Vec<i32>> = row.try_get(index)?;
                    val.map(|items| Value::Array(items.into_iter().map(Value::from).collect()))
                        .unwrap_or(Value::Null)
                }
                "INT8[]" => {
                    let val: Option<Vec<i64>> = row.try_get(index)?;
                    val.map(|items| Value::Array(items.into_iter().map(Value::from).collect()))
                        .unwrap_or(Value::Null)
                }
                _ => {
                    // Fallback: enums and other text-compatible types
                    let val: Option<String> = row.try_get_unchecked(index).ok().flatten();
                    val.map(Value::String).unwrap_or(Value::Null)
                }
            };

            map.insert(column.name().to_string(), value);
        }

        Ok(Value::Object(map))
    }

    fn rows_to_json(rows: &[PgRow]) -> Result<Vec<Value>, DatabaseError> {
        rows.iter().map(Self::row_to_json).collect()
    }

    fn column_names(row: Option<&PgRow>) -> Vec<String> {
        row.map(|row| row.columns().iter().map(|column| column.name().to_string()).collect())
            .unwrap_or_default()
    }

    async fn fetch_mutation(&self, query: &BuiltQuery) -> Result<MutationResult, DatabaseError> {
        let rows = self.timed(Self::built(query).fetch_all(&self.pool)).await?;
        Ok(MutationResult {
            affected_rows: rows.len() as u64,
            rows: Self::rows_to_json(&rows)?,
        })
    }
}

#[async_trait]
impl DatabaseProvider for PostgresProvider {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.timed(sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }

    async fn server_version(&self) -> Result<String, DatabaseError> {
        let version: String = self
            .timed(sqlx::query_scalar("SELECT current_setting('server_version')").fetch_one(&self.pool))
            .await?;
        Ok(version)
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, DatabaseError> {
        let query = format!(
            r#"
            SELECT n.nspname::text AS name, COUNT(c.oid) AS table_count
            FROM pg_namespace n
            LEFT JOIN pg_class c ON c.relnamespace = n.oid AND c.relkind IN {}
            WHERE {}
            GROUP BY n.nspname
            ORDER BY n.nspname
            "#,
            LISTED_RELKINDS, USER_SCHEMAS
        );

        let rows = self.timed(sqlx::query(&query).fetch_all(&self.pool)).await?;
        rows.iter()
            .map(|row| {
                Ok(SchemaInfo {
                    name: row.try_get("name")?,
                    table_count: row.try_get::<i64, _>("table_count")? as u64,
                })
            })
            .collect()
    }

    async fn list_tables(&self, schema: &str) -> Result<Vec<TableInfo>, DatabaseError> {
        let query = format!(
            r#"
            SELECT
                c.relname::text AS name,
                c.relkind::text AS kind,
                c.reltuples::bigint AS row_estimate,
                pg_total_relation_size(c.oid) AS size_bytes,
                obj_description(c.oid, 'pg_class') AS comment
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN {}
              AND NOT c.relispartition
            ORDER BY c.relname
            "#,
            LISTED_RELKINDS
        );

        let rows = self
            .timed(sqlx::query(&query).bind(schema).fetch_all(&self.pool))
            .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                let row_estimate: i64 = row.try_get("row_estimate")?;
                let size_bytes: i64 = row.try_get("size_bytes")?;
                Ok(TableInfo {
                    schema: schema.to_string(),
                    name: row.try_get("name")?,
                    kind: TableKind::from_relkind(&kind),
                    // reltuples is -1 until the table is first analyzed
                    row_estimate: u64::try_from(row_estimate).ok(),
                    size_bytes: u64::try_from(size_bytes).ok(),
                    comment: row.try_get("comment")?,
                })
            })
            .collect()
    }

    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema, DatabaseError> {
        let relation_query = r#"
            SELECT obj_description(c.oid, 'pg_class') AS comment
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2
        "#;

        let relation = self
            .timed(sqlx::query(relation_query).bind(schema).bind(table).fetch_optional(&self.pool))
            .await?
            .ok_or_else(|| DatabaseError::TableNotFound(format!("{}.{}", schema, table)))?;
        let comment: Option<String> = relation.try_get("comment")?;

        // Get column information
        let column_query = r#"
            SELECT
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.udt_name::text AS udt_name,
                c.is_nullable::text AS is_nullable,
                c.column_default::text AS column_default,
                c.is_identity::text AS is_identity,
                c.character_maximum_length::int4 AS max_length,
                c.ordinal_position::int4 AS ordinal_position,
                col_description(
                    (quote_ident(c.table_schema) || '.' || quote_ident(c.table_name))::regclass,
                    c.ordinal_position::int4
                ) AS comment
            FROM information_schema.columns c
            WHERE c.table_schema = $1
              AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let column_rows = self
            .timed(sqlx::query(column_query).bind(schema).bind(table).fetch_all(&self.pool))
            .await?;

        // Get primary key columns
        let pk_query = r#"
            SELECT kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
              AND tc.table_name = kcu.table_name
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
        "#;

        let pk_rows = self
            .timed(sqlx::query(pk_query).bind(schema).bind(table).fetch_all(&self.pool))
            .await?;

        let primary_key_columns: Vec<String> = pk_rows
            .iter()
            .map(|row| row.try_get::<String, _>("column_name"))
            .collect::<Result<Vec<_>, _>>()?;

        let fk_rows = self
            .timed(
                sqlx::query(FOREIGN_KEY_QUERY)
                    .bind(schema)
                    .bind(Some(table))
                    .fetch_all(&self.pool),
            )
            .await?;

        let foreign_keys: Vec<ForeignKey> = fk_rows
            .iter()
            .map(|row| {
                Ok(ForeignKey {
                    constraint_name: row.try_get("constraint_name")?,
                    column: row.try_get("column_name")?,
                    references_schema: row.try_get("references_schema")?,
                    references_table: row.try_get("references_table")?,
                    references_column: row.try_get("references_column")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        // Get indexes; expression keys are rendered with pg_get_indexdef
        let index_query = r#"
            SELECT
                ic.relname::text AS index_name,
                i.indisunique AS is_unique,
                i.indisprimary AS is_primary,
                am.amname::text AS method,
                pg_get_indexdef(i.indexrelid) AS index_definition,
                ARRAY(
                    SELECT COALESCE(a.attname::text, pg_get_indexdef(i.indexrelid, k.position::int4, true))
                    FROM unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, position)
                    LEFT JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = k.attnum
                    ORDER BY k.position
                ) AS columns
            FROM pg_index i
            JOIN pg_class ic ON ic.oid = i.indexrelid
            JOIN pg_class t ON t.oid = i.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_am am ON am.oid = ic.relam
            WHERE n.nspname = $1
              AND t.relname = $2
            ORDER BY i.indisprimary DESC, ic.relname
        "#;

        let index_rows = self
            .timed(sqlx::query(index_query).bind(schema).bind(table).fetch_all(&self.pool))
            .await?;

        let indexes: Vec<IndexInfo> = index_rows
            .iter()
            .map(|row| {
                Ok(IndexInfo {
                    name: row.try_get("index_name")?,
                    columns: row.try_get("columns")?,
                    unique: row.try_get("is_unique")?,
                    primary: row.try_get("is_primary")?,
                    method: row.try_get("method")?,
                    definition: row.try_get("index_definition")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        // Build column info
        let columns: Vec<ColumnInfo> = column_rows
            .iter()
            .map(|row| {
                let column_name: String = row.try_get("column_name")?;
                let is_nullable: String = row.try_get("is_nullable")?;
                let is_identity: Option<String> = row.try_get("is_identity")?;

                Ok(ColumnInfo {
                    is_primary_key: primary_key_columns.contains(&column_name),
                    name: column_name,
                    data_type: row.try_get("data_type")?,
                    udt_name: row.try_get("udt_name")?,
                    nullable: is_nullable == "YES",
                    default_value: row.try_get("column_default")?,
                    is_identity: is_identity.as_deref() == Some("YES"),
                    max_length: row.try_get("max_length")?,
                    ordinal_position: row.try_get("ordinal_position")?,
                    comment: row.try_get("comment")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let primary_key = if primary_key_columns.is_empty() {
            None
        } else {
            Some(primary_key_columns)
        };

        Ok(TableSchema {
            schema: schema.to_string(),
            name: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
            indexes,
            comment,
        })
    }

    async fn list_relationships(&self, schema: &str) -> Result<Vec<Relationship>, DatabaseError> {
        let rows = self
            .timed(
                sqlx::query(FOREIGN_KEY_QUERY)
                    .bind(schema)
                    .bind(Option::<&str>::None)
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(Relationship {
                    schema: schema.to_string(),
                    table: row.try_get("table_name")?,
                    foreign_key: ForeignKey {
                        constraint_name: row.try_get("constraint_name")?,
                        column: row.try_get("column_name")?,
                        references_schema: row.try_get("references_schema")?,
                        references_table: row.try_get("references_table")?,
                        references_column: row.try_get("references_column")?,
                    },
                })
            })
            .collect()
    }

    async fn get_rows(&self, table: &TableSchema, query: RowQuery) -> Result<RowsResponse, DatabaseError> {
        let limit = query.limit.unwrap_or(self.max_result_rows);

        let rows_query = builder::build_rows_query(
            table,
            &query.filters,
            query.filter_mode,
            &query.sort_rules(),
            limit,
            query.offset,
        )?;
        let rows = self.timed(Self::built(&rows_query).fetch_all(&self.pool)).await?;
        let json_rows = Self::rows_to_json(&rows)?;

        let total = self.count_rows(table, &query).await?.count;
        let has_more = query.offset + (json_rows.len() as u64) < total;

        Ok(RowsResponse {
            rows: json_rows,
            columns: table.column_names(),
            total,
            offset: query.offset,
            limit,
            has_more,
        })
    }

    async fn count_rows(&self, table: &TableSchema, query: &RowQuery) -> Result<CountResponse, DatabaseError> {
        let count_query = builder::build_count_query(table, &query.filters, query.filter_mode)?;

        let row = self
            .timed(Self::built(&count_query).fetch_one(&self.pool))
            .await?;
        let count: i64 = row.try_get("count")?;

        Ok(CountResponse { count: count as u64 })
    }

    async fn execute_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DatabaseError> {
        let start_time = Instant::now();
        let parameter_types = if params.is_empty() {
            Vec::new()
        } else {
            self.parameter_types(sql).await?
        };
        let typed = params
            .iter()
            .enumerate()
            .map(|(index, value)| {
                Argument::coerce(index + 1, value, parameter_types.get(index).map(String::as_str))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let statement = typed.into_iter().fold(sqlx::query(sql), arguments::bind);

        if formatter::returns_rows(sql) {
            let rows = self.timed(statement.fetch_all(&self.pool)).await?;
            if rows.len() as u64 > self.max_result_rows {
                return Err(DatabaseError::TooManyRows(self.max_result_rows));
            }

            Ok(QueryResult {
                columns: Self::column_names(rows.first()),
                rows: Self::rows_to_json(&rows)?,
                affected_rows: 0,
                execution_time_milliseconds: start_time.elapsed().as_millis() as u64,
                error: None,
            })
        } else {
            let done = self.timed(statement.execute(&self.pool)).await?;
            Ok(QueryResult {
                columns: vec![],
                rows: vec![],
                affected_rows: done.rows_affected(),
                execution_time_milliseconds: start_time.elapsed().as_millis() as u64,
                error: None,
            })
        }
    }

    async fn insert_row(&self, schema: &str, table: &str, values: &Map<String, Value>) -> Result<MutationResult, DatabaseError> {
        let table_schema = self.get_table_schema(schema, table).await?;
        let query = builder::build_insert(&table_schema, values)?;
        let result = self.fetch_mutation(&query).await?;
        info!(schema, table, "Inserted row");
        Ok(result)
    }

    async fn update_row(
        &self,
        schema: &str,
        table: &str,
        key: &RowKey,
        values: &Map<String, Value>,
    ) -> Result<MutationResult, DatabaseError> {
        let table_schema = self.get_table_schema(schema, table).await?;
        let query = builder::build_update(&table_schema, key, values)?;
        let result = self.fetch_mutation(&query).await?;
        info!(schema, table, affected = result.affected_rows, "Updated row");
        Ok(result)
    }

    async fn delete_rows(&self, schema: &str, table: &str, keys: &[RowKey]) -> Result<MutationResult, DatabaseError> {
        if keys.is_empty() {
            return Err(DatabaseError::InvalidRequest("no rows selected for deletion".to_string()));
        }

        let table_schema = self.get_table_schema(schema, table).await?;
        let queries = keys
            .iter()
            .map(|key| builder::build_delete(&table_schema, key))
            .collect::<Result<Vec<_>, _>>()?;

        let deleted = self
            .timed(async {
                let mut transaction = self.pool.begin().await?;
                let mut deleted = Vec::new();
                for query in &queries {
                    deleted.extend(Self::built(query).fetch_all(&mut *transaction).await?);
                }
                transaction.commit().await?;
                Ok::<_, sqlx::Error>(deleted)
            })
            .await?;

        info!(schema, table, affected = deleted.len(), "Deleted rows");
        Ok(MutationResult {
            affected_rows: deleted.len() as u64,
            rows: Self::rows_to_json(&deleted)?,
        })
    }

    async fn search(&self, term: &str, limit: u64) -> Result<Vec<SearchHit>, DatabaseError> {
        let query = format!(
            r#"
            SELECT * FROM (
                SELECT 'table' AS kind, n.nspname::text AS schema_name, c.relname::text AS table_name,
                       NULL::text AS column_name, NULL::text AS data_type
                FROM pg_class c
                JOIN pg_namespace n ON n.oid = c.relnamespace
                WHERE c.relkind IN {relkinds} AND {schemas} AND c.relname ILIKE $1
                UNION ALL
                SELECT 'column', n.nspname::text, c.relname::text, a.attname::text,
                       format_type(a.atttypid, a.atttypmod)
                FROM pg_attribute a
                JOIN pg_class c ON c.oid = a.attrelid
                JOIN pg_namespace n ON n.oid = c.relnamespace
                WHERE c.relkind IN {relkinds} AND {schemas}
                  AND a.attnum > 0 AND NOT a.attisdropped AND a.attname ILIKE $1
            ) hits
            ORDER BY kind DESC, schema_name, table_name, column_name
            LIMIT $2
            "#,
            relkinds = LISTED_RELKINDS,
            schemas = USER_SCHEMAS
        );
        let pattern = format!("%{}%", builder::escape_like(term));

        let rows = self
            .timed(
                sqlx::query(&query)
                    .bind(pattern)
                    .bind(limit as i64)
                    .fetch_all(&self.pool),
            )
            .await?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind")?;
                Ok(SearchHit {
                    kind: if kind == "table" { SearchHitKind::Table } else { SearchHitKind::Column },
                    schema: row.try_get("schema_name")?,
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    data_type: row.try_get("data_type")?,
                })
            })
            .collect()
    }

    async fn table_statistics(&self, schema: &str) -> Result<Vec<TableStatistics>, DatabaseError> {
        let query = r#"
            SELECT
                schemaname::text AS schema_name,
                relname::text AS table_name,
                COALESCE(seq_scan, 0)::bigint AS sequential_scans,
                COALESCE(idx_scan, 0)::bigint AS index_scans,
                COALESCE(n_live_tup, 0)::bigint AS live_rows
            FROM pg_stat_user_tables
            WHERE schemaname = $1
            ORDER BY relname
        "#;

        let rows = self
            .timed(sqlx::query(query).bind(schema).fetch_all(&self.pool))
            .await?;

        rows.iter()
            .map(|row| {
                Ok(TableStatistics {
                    schema: row.try_get("schema_name")?,
                    table: row.try_get("table_name")?,
                    sequential_scans: row.try_get("sequential_scans")?,
                    index_scans: row.try_get("index_scans")?,
                    live_rows: row.try_get("live_rows")?,
                })
            })
            .collect()
    }

    async fn column_sample(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        limit: u64,
    ) -> Result<Vec<Value>, DatabaseError> {
        let table_schema = self.get_table_schema(schema, table).await?;
        if table_schema.column(column).is_none() {
            return Err(DatabaseError::InvalidColumn(column.to_string()));
        }

        let quoted_column = quote_identifier(column);
        let query = format!(
            "SELECT {column} FROM {table} WHERE {column} IS NOT NULL LIMIT $1",
            column = quoted_column,
            table = qualified_name(schema, table)
        );
        let rows = self
            .timed(sqlx::query(&query).bind(limit as i64).fetch_all(&self.pool))
            .await?;

        rows.iter()
            .map(|row| {
                let mut object = Self::row_to_json(row)?;
                Ok(object
                    .as_object_mut()
                    .and_then(|map| map.remove(column))
                    .unwrap_or(Value::Null))
            })
            .collect()
    }
}
