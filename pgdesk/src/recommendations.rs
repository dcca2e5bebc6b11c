//! Index recommendations from catalog metadata and scan statistics

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{TableSchema, TableStatistics};
use crate::sql::{qualified_name, quote_identifier};

/// Sequential scans before a table counts as scan-heavy
pub const SEQUENTIAL_SCAN_THRESHOLD: i64 = 100;

/// Live rows before sequential scans start to matter
pub const LARGE_TABLE_ROWS: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecommendation {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub reason: String,
    pub priority: Priority,
    /// Statement that applies the recommendation, when there is one
    pub statement: Option<String>,
}

/// Foreign key column lists, one per constraint, in key order
fn foreign_key_columns(table: &TableSchema) -> Vec<(String, Vec<String>)> {
    let mut constraints: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for foreign_key in &table.foreign_keys {
        constraints
            .entry(foreign_key.constraint_name.as_str())
            .or_default()
            .push(foreign_key.column.clone());
    }
    constraints
        .into_iter()
        .map(|(name, columns)| (name.to_string(), columns))
        .collect()
}

fn is_covered(table: &TableSchema, columns: &[String]) -> bool {
    table
        .indexes
        .iter()
        .any(|index| index.columns.starts_with(columns))
}

fn create_index_statement(table: &TableSchema, columns: &[String]) -> String {
    let index_name = format!("{}_{}_idx", table.name, columns.join("_"));
    format!(
        "CREATE INDEX {} ON {} ({});",
        quote_identifier(&index_name),
        qualified_name(&table.schema, &table.name),
        columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Recommendations for `tables`, most important first
pub fn recommend(tables: &[TableSchema], statistics: &[TableStatistics]) -> Vec<IndexRecommendation> {
    let mut recommendations = Vec::new();

    for table in tables {
        for (constraint, columns) in foreign_key_columns(table) {
            if is_covered(table, &columns) {
                continue;
            }
            recommendations.push(IndexRecommendation {
                schema: table.schema.clone(),
                table: table.name.clone(),
                reason: format!(
                    "Foreign key {} has no index starting with its columns; joins and cascading deletes scan the table",
                    constraint
                ),
                priority: Priority::High,
                statement: Some(create_index_statement(table, &columns)),
                columns,
            });
        }

        if table.primary_key.is_none() {
            recommendations.push(IndexRecommendation {
                schema: table.schema.clone(),
                table: table.name.clone(),
                columns: vec![],
                reason: "Table has no primary key; rows cannot be edited or deleted safely".to_string(),
                priority: Priority::Low,
                statement: None,
            });
        }
    }

    for stats in statistics {
        let scan_heavy = stats.sequential_scans >= SEQUENTIAL_SCAN_THRESHOLD
            && stats.sequential_scans > stats.index_scans.saturating_mul(10)
            && stats.live_rows >= LARGE_TABLE_ROWS;
        if scan_heavy {
            recommendations.push(IndexRecommendation {
                schema: stats.schema.clone(),
                table: stats.table.clone(),
                columns: vec![],
                reason: format!(
                    "{} sequential scans against {} index scans over ~{} rows; review the filters used on this table",
                    stats.sequential_scans, stats.index_scans, stats.live_rows
                ),
                priority: Priority::Medium,
                statement: None,
            });
        }
    }

    recommendations.sort_by(|left, right| {
        left.priority
            .cmp(&right.priority)
            .then_with(|| left.table.cmp(&right.table))
            .then_with(|| left.columns.cmp(&right.columns))
    });
    recommendations
}
