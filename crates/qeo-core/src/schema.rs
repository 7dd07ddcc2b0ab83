//! Catalog snapshot types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tables of one schema as seen through `information_schema` and `pg_index`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub schema: String,
    pub tables: Vec<TableInfo>,
}

impl SchemaSnapshot {
    pub fn empty(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Index information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// Key columns in index order
    pub columns: Vec<String>,
}

/// Planner statistics for one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    /// Estimated row count (`pg_class.reltuples`)
    pub rows: f64,
    /// Non-primary indexes
    pub indexes: Vec<IndexInfo>,
}

/// Table stats keyed by table name
pub type StatsMap = BTreeMap<String, TableStats>;

/// Average column widths in bytes keyed by column name
pub type ColumnWidths = BTreeMap<String, u64>;
