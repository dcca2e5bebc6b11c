//! Parameterized query generation
//!
//! Every identifier that reaches the generated SQL has been checked against
//! introspected columns and quoted; every user value is bound as text and cast
//! to the target column type (`$n::type`), so one binding path serves all
//! PostgreSQL types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::traits::DatabaseError;
use crate::schema::{
    ColumnInfo, FilterMode, FilterOperator, FilterRule, RowKey, SortOrder, SortRule, TableSchema,
};
use crate::sql::{qualified_name, quote_identifier};

/// SQL text plus text-encoded bind values (`None` binds NULL)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<Option<String>>,
}

/// Join type for query-builder joins
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }
}

/// `left = right` column pair of a join condition; columns may be `table.column`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCondition {
    pub left: String,
    pub right: String,
}

/// A joined table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    #[serde(default)]
    pub kind: JoinKind,
    /// Defaults to the base table's schema
    pub schema: Option<String>,
    pub table: String,
    pub alias: Option<String>,
    pub on: Vec<JoinCondition>,
}

/// A projected column, optionally `table.column` qualified and aliased
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectColumn {
    pub column: String,
    pub alias: Option<String>,
}

/// Everything the visual query builder can express
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectSpec {
    pub schema: String,
    pub table: String,
    pub alias: Option<String>,
    /// Empty selects every column
    #[serde(default)]
    pub columns: Vec<SelectColumn>,
    #[serde(default)]
    pub joins: Vec<JoinSpec>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub filter_mode: FilterMode,
    #[serde(default)]
    pub sort: Vec<SortRule>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectSpec {
    /// `(schema, table)` of the base table followed by every joined table
    pub fn referenced_tables(&self) -> Vec<(String, String)> {
        let mut tables = vec![(self.schema.clone(), self.table.clone())];
        for join in &self.joins {
            let schema = join.schema.clone().unwrap_or_else(|| self.schema.clone());
            tables.push((schema, join.table.clone()));
        }
        tables
    }
}

/// Resolves user column references against the tables in scope
struct ColumnScope<'a> {
    entries: Vec<ScopeEntry<'a>>,
}

struct ScopeEntry<'a> {
    /// Rendered qualifier, `None` for single-table statements
    qualifier: Option<String>,
    names: Vec<String>,
    table: &'a TableSchema,
}

impl<'a> ColumnScope<'a> {
    fn single(table: &'a TableSchema) -> Self {
        Self {
            entries: vec![ScopeEntry {
                qualifier: None,
                names: vec![table.name.clone()],
                table,
            }],
        }
    }

    fn push(&mut self, alias: Option<&str>, table: &'a TableSchema) {
        let reference = alias.unwrap_or(&table.name).to_string();
        let mut names = vec![reference.clone()];
        if alias.is_some() {
            names.push(table.name.clone());
        }
        self.entries.push(ScopeEntry {
            qualifier: Some(quote_identifier(&reference)),
            names,
            table,
        });
    }

    /// Resolve `column` or `table.column` to its rendered SQL and catalog entry
    fn resolve(&self, reference: &str) -> Result<(String, &'a ColumnInfo), DatabaseError> {
        let (table_name, column_name) = match reference.split_once('.') {
            Some((table, column)) if self.entries.len() > 1 => (Some(table), column),
            _ => (None, reference),
        };

        for entry in &self.entries {
            if let Some(table_name) = table_name {
                if !entry.names.iter().any(|name| name == table_name) {
                    continue;
                }
            }
            if let Some(column) = entry.table.column(column_name) {
                let rendered = match &entry.qualifier {
                    Some(qualifier) => format!("{}.{}", qualifier, quote_identifier(column_name)),
                    None => quote_identifier(column_name),
                };
                return Ok((rendered, column));
            }
        }

        Err(DatabaseError::InvalidColumn(reference.to_string()))
    }
}

/// Render a JSON value as the text form PostgreSQL accepts for any type
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern
pub fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn list_values(value: &Value) -> Vec<Option<String>> {
    match value {
        Value::Array(items) => items.iter().map(value_to_text).collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| Some(item.to_string()))
            .collect(),
        other => vec![value_to_text(other)],
    }
}

struct Params {
    first: usize,
    values: Vec<Option<String>>,
}

impl Params {
    fn new(first: usize) -> Self {
        Self {
            first,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: Option<String>) -> String {
        self.values.push(value);
        format!("${}", self.first + self.values.len() - 1)
    }
}

fn render_condition(
    rendered: &str,
    column: &ColumnInfo,
    rule: &FilterRule,
    params: &mut Params,
) -> Result<String, DatabaseError> {
    let cast = column.cast_type();
    let value = rule.value.as_ref().filter(|value| !value.is_null());

    if rule.operator.needs_value() && value.is_none() {
        return Err(DatabaseError::InvalidRequest(format!(
            "filter on column '{}' requires a value; use isNull or isNotNull to match NULL",
            rule.column
        )));
    }

    let text = value.and_then(value_to_text).unwrap_or_default();
    let condition = match rule.operator {
        FilterOperator::Equals => format!("{} = {}::{}", rendered, params.push(Some(text)), cast),
        FilterOperator::NotEquals => format!(
            "{} IS DISTINCT FROM {}::{}",
            rendered,
            params.push(Some(text)),
            cast
        ),
        FilterOperator::GreaterThan => {
            format!("{} > {}::{}", rendered, params.push(Some(text)), cast)
        }
        FilterOperator::GreaterThanOrEqual => {
            format!("{} >= {}::{}", rendered, params.push(Some(text)), cast)
        }
        FilterOperator::LessThan => format!("{} < {}::{}", rendered, params.push(Some(text)), cast),
        FilterOperator::LessThanOrEqual => {
            format!("{} <= {}::{}", rendered, params.push(Some(text)), cast)
        }
        FilterOperator::Contains => format!(
            "{}::text ILIKE {}",
            rendered,
            params.push(Some(format!("%{}%", escape_like(&text))))
        ),
        FilterOperator::NotContains => format!(
            "{}::text NOT ILIKE {}",
            rendered,
            params.push(Some(format!("%{}%", escape_like(&text))))
        ),
        FilterOperator::StartsWith => format!(
            "{}::text ILIKE {}",
            rendered,
            params.push(Some(format!("{}%", escape_like(&text))))
        ),
        FilterOperator::EndsWith => format!(
            "{}::text ILIKE {}",
            rendered,
            params.push(Some(format!("%{}", escape_like(&text))))
        ),
        FilterOperator::Like => format!("{}::text LIKE {}", rendered, params.push(Some(text))),
        FilterOperator::In | FilterOperator::NotIn => {
            let items = value.map(list_values).unwrap_or_default();
            let negated = rule.operator == FilterOperator::NotIn;
            if items.is_empty() {
                return Ok(if negated { "TRUE" } else { "FALSE" }.to_string());
            }
            let placeholders: Vec<String> = items
                .into_iter()
                .map(|item| format!("{}::{}", params.push(item), cast))
                .collect();
            format!(
                "{} {} ({})",
                rendered,
                if negated { "NOT IN" } else { "IN" },
                placeholders.join(", ")
            )
        }
        FilterOperator::IsNull => format!("{} IS NULL", rendered),
        FilterOperator::IsNotNull => format!("{} IS NOT NULL", rendered),
    };

    Ok(condition)
}

fn where_clause_in_scope(
    scope: &ColumnScope<'_>,
    filters: &[FilterRule],
    mode: FilterMode,
    params: &mut Params,
) -> Result<String, DatabaseError> {
    if filters.is_empty() {
        return Ok(String::new());
    }

    let mut conditions = Vec::with_capacity(filters.len());
    for rule in filters {
        let (rendered, column) = scope.resolve(&rule.column)?;
        conditions.push(render_condition(&rendered, column, rule, params)?);
    }

    let joiner = match mode {
        FilterMode::And => " AND ",
        FilterMode::Or => " OR ",
    };
    Ok(format!(" WHERE {}", conditions.join(joiner)))
}

fn order_clause_in_scope(
    scope: &ColumnScope<'_>,
    sorts: &[SortRule],
) -> Result<String, DatabaseError> {
    if sorts.is_empty() {
        return Ok(String::new());
    }

    let terms = sorts
        .iter()
        .map(|rule| {
            let (rendered, _) = scope.resolve(&rule.column)?;
            let direction = match rule.direction {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            Ok(format!("{} {}", rendered, direction))
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// Build a WHERE clause (with leading space) from filter rules
///
/// Placeholders are numbered from `first_param`. Returns an empty clause when
/// there are no filters.
pub fn build_where_clause(
    table: &TableSchema,
    filters: &[FilterRule],
    mode: FilterMode,
    first_param: usize,
) -> Result<(String, Vec<Option<String>>), DatabaseError> {
    let scope = ColumnScope::single(table);
    let mut params = Params::new(first_param);
    let clause = where_clause_in_scope(&scope, filters, mode, &mut params)?;
    Ok((clause, params.values))
}

/// Build an ORDER BY clause (with leading space) from sort rules
pub fn build_order_clause(table: &TableSchema, sorts: &[SortRule]) -> Result<String, DatabaseError> {
    order_clause_in_scope(&ColumnScope::single(table), sorts)
}

/// Paginated `SELECT *` over one table
pub fn build_rows_query(
    table: &TableSchema,
    filters: &[FilterRule],
    mode: FilterMode,
    sorts: &[SortRule],
    limit: u64,
    offset: u64,
) -> Result<BuiltQuery, DatabaseError> {
    let (where_clause, params) = build_where_clause(table, filters, mode, 1)?;
    let order_clause = build_order_clause(table, sorts)?;
    let sql = format!(
        "SELECT * FROM {}{}{} LIMIT {} OFFSET {}",
        qualified_name(&table.schema, &table.name),
        where_clause,
        order_clause,
        limit,
        offset
    );
    Ok(BuiltQuery { sql, params })
}

/// `SELECT COUNT(*)` over one table with the same filters as [`build_rows_query`]
pub fn build_count_query(
    table: &TableSchema,
    filters: &[FilterRule],
    mode: FilterMode,
) -> Result<BuiltQuery, DatabaseError> {
    let (where_clause, params) = build_where_clause(table, filters, mode, 1)?;
    let sql = format!(
        "SELECT COUNT(*) AS count FROM {}{}",
        qualified_name(&table.schema, &table.name),
        where_clause
    );
    Ok(BuiltQuery { sql, params })
}

/// Build a SELECT from a query-builder spec
///
/// `tables` must contain the introspected schema of the base table and of
/// every joined table.
pub fn build_select(spec: &SelectSpec, tables: &[TableSchema]) -> Result<BuiltQuery, DatabaseError> {
    let find = |schema: &str, table: &str| {
        tables
            .iter()
            .find(|candidate| candidate.schema == schema && candidate.name == table)
            .ok_or_else(|| DatabaseError::TableNotFound(format!("{}.{}", schema, table)))
    };

    let base = find(&spec.schema, &spec.table)?;
    let joined = spec
        .joins
        .iter()
        .map(|join| find(join.schema.as_deref().unwrap_or(&spec.schema), &join.table))
        .collect::<Result<Vec<_>, _>>()?;

    let scope = if spec.joins.is_empty() && spec.alias.is_none() {
        ColumnScope::single(base)
    } else {
        let mut scope = ColumnScope {
            entries: Vec::with_capacity(spec.joins.len() + 1),
        };
        scope.push(spec.alias.as_deref(), base);
        for (join, table) in spec.joins.iter().zip(&joined) {
            scope.push(join.alias.as_deref(), table);
        }
        scope
    };

    let projection = if spec.columns.is_empty() {
        "*".to_string()
    } else {
        spec.columns
            .iter()
            .map(|column| {
                let (rendered, _) = scope.resolve(&column.column)?;
                Ok(match &column.alias {
                    Some(alias) => format!("{} AS {}", rendered, quote_identifier(alias)),
                    None => rendered,
                })
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?
            .join(", ")
    };

    let mut sql = format!(
        "SELECT {} FROM {}",
        projection,
        qualified_name(&base.schema, &base.name)
    );
    if let Some(alias) = &spec.alias {
        sql.push_str(&format!(" AS {}", quote_identifier(alias)));
    }

    for (join, table) in spec.joins.iter().zip(&joined) {
        if join.on.is_empty() {
            return Err(DatabaseError::InvalidRequest(format!(
                "join on '{}' needs at least one condition",
                join.table
            )));
        }
        let conditions = join
            .on
            .iter()
            .map(|condition| {
                let (left, _) = scope.resolve(&condition.left)?;
                let (right, _) = scope.resolve(&condition.right)?;
                Ok(format!("{} = {}", left, right))
            })
            .collect::<Result<Vec<_>, DatabaseError>>()?;

        sql.push_str(&format!(
            " {} {}",
            join.kind.keyword(),
            qualified_name(&table.schema, &table.name)
        ));
        if let Some(alias) = &join.alias {
            sql.push_str(&format!(" AS {}", quote_identifier(alias)));
        }
        sql.push_str(&format!(" ON {}", conditions.join(" AND ")));
    }

    let mut params = Params::new(1);
    sql.push_str(&where_clause_in_scope(
        &scope,
        &spec.filters,
        spec.filter_mode,
        &mut params,
    )?);
    sql.push_str(&order_clause_in_scope(&scope, &spec.sort)?);

    if let Some(limit) = spec.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = spec.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    Ok(BuiltQuery {
        sql,
        params: params.values,
    })
}

fn key_condition(
    table: &TableSchema,
    key: &RowKey,
    params: &mut Params,
) -> Result<String, DatabaseError> {
    if key.is_empty() {
        return Err(DatabaseError::InvalidRequest(
            "row key must name at least one column".to_string(),
        ));
    }

    if let Some(primary_key) = &table.primary_key {
        if let Some(missing) = primary_key.iter().find(|column| !key.contains_key(*column)) {
            return Err(DatabaseError::InvalidRequest(format!(
                "row key is missing primary key column '{}'",
                missing
            )));
        }
    }

    let conditions = key
        .iter()
        .map(|(name, value)| {
            let column = table
                .column(name)
                .ok_or_else(|| DatabaseError::InvalidColumn(name.clone()))?;
            let rendered = quote_identifier(name);
            Ok(match value_to_text(value) {
                Some(text) => format!(
                    "{} = {}::{}",
                    rendered,
                    params.push(Some(text)),
                    column.cast_type()
                ),
                None => format!("{} IS NULL", rendered),
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok(conditions.join(" AND "))
}

/// `INSERT ... RETURNING *`; an empty value map inserts a row of defaults
pub fn build_insert(
    table: &TableSchema,
    values: &serde_json::Map<String, Value>,
) -> Result<BuiltQuery, DatabaseError> {
    let target = qualified_name(&table.schema, &table.name);
    if values.is_empty() {
        return Ok(BuiltQuery {
            sql: format!("INSERT INTO {} DEFAULT VALUES RETURNING *", target),
            params: vec![],
        });
    }

    let mut params = Params::new(1);
    let mut columns = Vec::with_capacity(values.len());
    let mut placeholders = Vec::with_capacity(values.len());

    for (name, value) in values {
        let column = table
            .column(name)
            .ok_or_else(|| DatabaseError::InvalidColumn(name.clone()))?;
        columns.push(quote_identifier(name));
        placeholders.push(format!(
            "{}::{}",
            params.push(value_to_text(value)),
            column.cast_type()
        ));
    }

    Ok(BuiltQuery {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            target,
            columns.join(", "),
            placeholders.join(", ")
        ),
        params: params.values,
    })
}

/// `UPDATE ... SET ... WHERE <key> RETURNING *`
pub fn build_update(
    table: &TableSchema,
    key: &RowKey,
    values: &serde_json::Map<String, Value>,
) -> Result<BuiltQuery, DatabaseError> {
    if values.is_empty() {
        return Err(DatabaseError::InvalidRequest(
            "update must change at least one column".to_string(),
        ));
    }

    let mut params = Params::new(1);
    let assignments = values
        .iter()
        .map(|(name, value)| {
            let column = table
                .column(name)
                .ok_or_else(|| DatabaseError::InvalidColumn(name.clone()))?;
            Ok(format!(
                "{} = {}::{}",
                quote_identifier(name),
                params.push(value_to_text(value)),
                column.cast_type()
            ))
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    let condition = key_condition(table, key, &mut params)?;

    Ok(BuiltQuery {
        sql: format!(
            "UPDATE {} SET {} WHERE {} RETURNING *",
            qualified_name(&table.schema, &table.name),
            assignments.join(", "),
            condition
        ),
        params: params.values,
    })
}

/// `DELETE ... WHERE <key> RETURNING *` for a single row key
pub fn build_delete(table: &TableSchema, key: &RowKey) -> Result<BuiltQuery, DatabaseError> {
    let mut params = Params::new(1);
    let condition = key_condition(table, key, &mut params)?;
    Ok(BuiltQuery {
        sql: format!(
            "DELETE FROM {} WHERE {} RETURNING *",
            qualified_name(&table.schema, &table.name),
            condition
        ),
        params: params.values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnInfo, ForeignKey};
    use serde_json::json;

    fn column(name: &str, data_type: &str, udt_name: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt_name.to_string(),
            nullable: true,
            default_value: None,
            is_primary_key: name == "id",
            is_identity: false,
            max_length: None,
            ordinal_position: 0,
            comment: None,
        }
    }

    fn users() -> TableSchema {
        TableSchema {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns: vec![
                column("id", "integer", "int4"),
                column("name", "text", "text"),
                column("age", "integer", "int4"),
                column("mood", "USER-DEFINED", "mood"),
            ],
            primary_key: Some(vec!["id".to_string()]),
            foreign_keys: vec![],
            indexes: vec![],
            comment: None,
        }
    }

    fn orders() -> TableSchema {
        TableSchema {
            schema: "public".to_string(),
            name: "orders".to_string(),
            columns: vec![
                column("id", "integer", "int4"),
                column("user_id", "integer", "int4"),
                column("total", "numeric", "numeric"),
            ],
            primary_key: Some(vec!["id".to_string()]),
            foreign_keys: vec![ForeignKey {
                constraint_name: "orders_user_id_fkey".to_string(),
                column: "user_id".to_string(),
                references_schema: "public".to_string(),
                references_table: "users".to_string(),
                references_column: "id".to_string(),
            }],
            indexes: vec![],
            comment: None,
        }
    }

    fn rule(column: &str, operator: FilterOperator, value: Option<Value>) -> FilterRule {
        FilterRule {
            column: column.to_string(),
            operator,
            value,
        }
    }

    #[test]
    fn test_where_clause_casts_to_column_type() {
        let (clause, params) = build_where_clause(
            &users(),
            &[
                rule("age", FilterOperator::GreaterThan, Some(json!(30))),
                rule("mood", FilterOperator::Equals, Some(json!("happy"))),
            ],
            FilterMode::And,
            1,
        )
        .unwrap();

        assert_eq!(
            clause,
            " WHERE \"age\" > $1::integer AND \"mood\" = $2::\"mood\""
        );
        assert_eq!(params, vec![Some("30".to_string()), Some("happy".to_string())]);
    }

    #[test]
    fn test_where_clause_or_mode_and_offset() {
        let (clause, _) = build_where_clause(
            &users(),
            &[
                rule("name", FilterOperator::Contains, Some(json!("an"))),
                rule("age", FilterOperator::IsNull, None),
            ],
            FilterMode::Or,
            3,
        )
        .unwrap();
        assert_eq!(clause, " WHERE \"name\"::text ILIKE $3 OR \"age\" IS NULL");
    }

    #[test]
    fn test_like_patterns_escape_wildcards() {
        let (_, params) = build_where_clause(
            &users(),
            &[rule("name", FilterOperator::StartsWith, Some(json!("50%_off")))],
            FilterMode::And,
            1,
        )
        .unwrap();
        assert_eq!(params, vec![Some("50\\%\\_off%".to_string())]);
    }

    #[test]
    fn test_in_operator_expands_placeholders() {
        let (clause, params) = build_where_clause(
            &users(),
            &[rule("id", FilterOperator::In, Some(json!("1, 2,3")))],
            FilterMode::And,
            1,
        )
        .unwrap();
        assert_eq!(clause, " WHERE \"id\" IN ($1::integer, $2::integer, $3::integer)");
        assert_eq!(params.len(), 3);

        let (clause, params) = build_where_clause(
            &users(),
            &[rule("id", FilterOperator::NotIn, Some(json!([])))],
            FilterMode::And,
            1,
        )
        .unwrap();
        assert_eq!(clause, " WHERE TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_equals_without_value_is_rejected() {
        for operator in [FilterOperator::Equals, FilterOperator::NotEquals] {
            for value in [None, Some(Value::Null)] {
                let result = build_where_clause(
                    &users(),
                    &[rule("name", operator, value)],
                    FilterMode::And,
                    1,
                );
                assert!(matches!(result, Err(DatabaseError::InvalidRequest(_))));
            }
        }

        let (clause, params) = build_where_clause(
            &users(),
            &[rule("name", FilterOperator::IsNull, None)],
            FilterMode::And,
            1,
        )
        .unwrap();
        assert_eq!(clause, " WHERE \"name\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_missing_value_is_rejected() {
        let result = build_where_clause(
            &users(),
            &[rule("age", FilterOperator::LessThan, None)],
            FilterMode::And,
            1,
        );
        assert!(matches!(result, Err(DatabaseError::InvalidRequest(_))));
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let result = build_where_clause(
            &users(),
            &[rule("password\"; DROP TABLE users; --", FilterOperator::Equals, Some(json!(1)))],
            FilterMode::And,
            1,
        );
        assert!(matches!(result, Err(DatabaseError::InvalidColumn(_))));

        let result = build_order_clause(
            &users(),
            &[SortRule {
                column: "nope".to_string(),
                direction: SortOrder::Ascending,
            }],
        );
        assert!(matches!(result, Err(DatabaseError::InvalidColumn(_))));
    }

    #[test]
    fn test_rows_and_count_queries() {
        let filters = [rule("age", FilterOperator::GreaterThanOrEqual, Some(json!(18)))];
        let sorts = [SortRule {
            column: "name".to_string(),
            direction: SortOrder::Descending,
        }];
        let rows = build_rows_query(&users(), &filters, FilterMode::And, &sorts, 50, 100).unwrap();
        assert_eq!(
            rows.sql,
            "SELECT * FROM \"public\".\"users\" WHERE \"age\" >= $1::integer ORDER BY \"name\" DESC LIMIT 50 OFFSET 100"
        );

        let count = build_count_query(&users(), &filters, FilterMode::And).unwrap();
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS count FROM \"public\".\"users\" WHERE \"age\" >= $1::integer"
        );
        assert_eq!(count.params, rows.params);
    }

    #[test]
    fn test_select_with_join() {
        let spec = SelectSpec {
            schema: "public".to_string(),
            table: "users".to_string(),
            alias: Some("u".to_string()),
            columns: vec![
                SelectColumn {
                    column: "u.name".to_string(),
                    alias: None,
                },
                SelectColumn {
                    column: "o.total".to_string(),
                    alias: Some("order_total".to_string()),
                },
            ],
            joins: vec![JoinSpec {
                kind: JoinKind::Left,
                schema: None,
                table: "orders".to_string(),
                alias: Some("o".to_string()),
                on: vec![JoinCondition {
                    left: "u.id".to_string(),
                    right: "o.user_id".to_string(),
                }],
            }],
            filters: vec![rule("o.total", FilterOperator::GreaterThan, Some(json!("9.99")))],
            filter_mode: FilterMode::And,
            sort: vec![SortRule {
                column: "total".to_string(),
                direction: SortOrder::Descending,
            }],
            limit: Some(10),
            offset: None,
        };

        let built = build_select(&spec, &[users(), orders()]).unwrap();
        assert_eq!(
            built.sql,
            "SELECT \"u\".\"name\", \"o\".\"total\" AS \"order_total\" FROM \"public\".\"users\" AS \"u\" \
             LEFT JOIN \"public\".\"orders\" AS \"o\" ON \"u\".\"id\" = \"o\".\"user_id\" \
             WHERE \"o\".\"total\" > $1::numeric ORDER BY \"o\".\"total\" DESC LIMIT 10"
        );
        assert_eq!(built.params, vec![Some("9.99".to_string())]);
        assert_eq!(
            spec.referenced_tables(),
            vec![
                ("public".to_string(), "users".to_string()),
                ("public".to_string(), "orders".to_string())
            ]
        );
    }

    #[test]
    fn test_select_without_join_condition_is_rejected() {
        let spec = SelectSpec {
            schema: "public".to_string(),
            table: "users".to_string(),
            alias: None,
            columns: vec![],
            joins: vec![JoinSpec {
                kind: JoinKind::Inner,
                schema: None,
                table: "orders".to_string(),
                alias: None,
                on: vec![],
            }],
            filters: vec![],
            filter_mode: FilterMode::And,
            sort: vec![],
            limit: None,
            offset: None,
        };
        assert!(build_select(&spec, &[users(), orders()]).is_err());
    }

    #[test]
    fn test_insert() {
        let mut values = serde_json::Map::new();
        values.insert("name".to_string(), json!("Ada"));
        values.insert("age".to_string(), Value::Null);
        let built = build_insert(&users(), &values).unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO \"public\".\"users\" (\"age\", \"name\") VALUES ($1::integer, $2::text) RETURNING *"
        );
        assert_eq!(built.params, vec![None, Some("Ada".to_string())]);

        let defaults = build_insert(&users(), &serde_json::Map::new()).unwrap();
        assert!(defaults.sql.contains("DEFAULT VALUES"));
    }

    #[test]
    fn test_fixed_length_columns_cast_without_length() {
        let mut codes = users();
        codes.columns.push(column("code", "character", "bpchar"));
        codes.columns.push(column("flags", "bit", "bit"));

        let mut values = serde_json::Map::new();
        values.insert("code".to_string(), json!("ABC"));
        values.insert("flags".to_string(), json!("101"));
        let built = build_insert(&codes, &values).unwrap();
        assert_eq!(
            built.sql,
            "INSERT INTO \"public\".\"users\" (\"code\", \"flags\") VALUES ($1::bpchar, $2::varbit) RETURNING *"
        );

        let (clause, _) = build_where_clause(
            &codes,
            &[rule("code", FilterOperator::Equals, Some(json!("ABC")))],
            FilterMode::And,
            1,
        )
        .unwrap();
        assert_eq!(clause, " WHERE \"code\" = $1::bpchar");
    }

    #[test]
    fn test_update_requires_primary_key() {
        let mut values = serde_json::Map::new();
        values.insert("name".to_string(), json!("Grace"));

        let mut key = RowKey::new();
        key.insert("id".to_string(), json!(7));
        let built = build_update(&users(), &key, &values).unwrap();
        assert_eq!(
            built.sql,
            "UPDATE \"public\".\"users\" SET \"name\" = $1::text WHERE \"id\" = $2::integer RETURNING *"
        );

        let mut partial = RowKey::new();
        partial.insert("name".to_string(), json!("Ada"));
        assert!(build_update(&users(), &partial, &values).is_err());
        assert!(build_update(&users(), &key, &serde_json::Map::new()).is_err());
    }

    #[test]
    fn test_delete_never_without_key() {
        assert!(build_delete(&users(), &RowKey::new()).is_err());

        let mut key = RowKey::new();
        key.insert("id".to_string(), json!(3));
        let built = build_delete(&users(), &key).unwrap();
        assert_eq!(
            built.sql,
            "DELETE FROM \"public\".\"users\" WHERE \"id\" = $1::integer RETURNING *"
        );
    }
}
