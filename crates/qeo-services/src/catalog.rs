//! Catalog inspection
//!
//! Schema snapshots from `information_schema` and lightweight planner
//! statistics from `pg_class`, `pg_index` and `pg_stats`. None of these
//! queries scan user tables.

use qeo_core::{
    ColumnInfo, ColumnWidths, Connection, IndexInfo, QueryResult, Row, SchemaSnapshot, StatsMap,
    TableInfo, TableStats, Value,
};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ServiceError, ServiceResult};

const TABLES_SQL: &str = "SELECT table_name \
     FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT table_name, column_name, data_type, is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = $1 \
     ORDER BY table_name, ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT t.relname AS table_name, a.attname AS column_name \
     FROM pg_index ix \
     JOIN pg_class t ON t.oid = ix.indrelid \
     JOIN pg_namespace ns ON ns.oid = t.relnamespace \
     JOIN pg_attribute a ON a.attrelid = t.oid \
     JOIN generate_subscripts(ix.indkey, 1) k(i) ON a.attnum = ix.indkey[k.i] \
     WHERE ns.nspname = $1 AND ix.indisprimary \
     ORDER BY t.relname, k.i";

const SCHEMA_INDEXES_SQL: &str = "SELECT t.relname AS table_name, i.relname AS name, \
     ix.indisunique AS is_unique, array_agg(a.attname ORDER BY k.i) AS columns \
     FROM pg_class t \
     JOIN pg_namespace ns ON ns.oid = t.relnamespace \
     JOIN pg_index ix ON ix.indrelid = t.oid \
     JOIN pg_class i ON i.oid = ix.indexrelid \
     JOIN generate_subscripts(ix.indkey, 1) k(i) ON TRUE \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ix.indkey[k.i] \
     WHERE ns.nspname = $1 AND NOT ix.indisprimary \
     GROUP BY t.relname, i.relname, ix.indisunique \
     ORDER BY t.relname, i.relname";

const ROW_COUNTS_SQL: &str = "SELECT c.relname AS table_name, c.reltuples::bigint AS rows \
     FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = $1 AND c.relkind = 'r' AND c.relname = ANY($2) \
     ORDER BY c.relname";

const TABLE_INDEXES_SQL: &str = "SELECT t.relname AS table_name, i.relname AS name, \
     ix.indisunique AS is_unique, array_agg(a.attname ORDER BY k.i) AS columns \
     FROM pg_class t \
     JOIN pg_namespace ns ON ns.oid = t.relnamespace \
     JOIN pg_index ix ON ix.indrelid = t.oid \
     JOIN pg_class i ON i.oid = ix.indexrelid \
     JOIN generate_subscripts(ix.indkey, 1) k(i) ON TRUE \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ix.indkey[k.i] \
     WHERE ns.nspname = $1 AND t.relname = ANY($2) AND NOT ix.indisprimary \
     GROUP BY t.relname, i.relname, ix.indisunique \
     ORDER BY t.relname, i.relname";

const COLUMN_WIDTHS_SQL: &str = "SELECT attname, avg_width \
     FROM pg_stats \
     WHERE schemaname = $1 AND tablename = $2";

async fn catalog_query(
    conn: &dyn Connection,
    sql: &str,
    params: &[Value],
) -> ServiceResult<QueryResult> {
    conn.query(sql, params)
        .await
        .map_err(|e| ServiceError::Catalog(e.to_string()))
}

fn text(row: &Row, column: &str) -> String {
    row.get_by_name(column)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn index_from_row(row: &Row) -> IndexInfo {
    IndexInfo {
        name: text(row, "name"),
        unique: row
            .get_by_name("is_unique")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        columns: row
            .get_by_name("columns")
            .and_then(|v| v.as_string_array())
            .unwrap_or_default(),
    }
}

/// Tables, columns, primary keys and secondary indexes of one schema
#[tracing::instrument(skip(conn))]
pub async fn fetch_schema(
    conn: &dyn Connection,
    schema: &str,
    timeout_ms: u64,
) -> ServiceResult<SchemaSnapshot> {
    conn.set_statement_timeout(timeout_ms)
        .await
        .map_err(|e| ServiceError::Catalog(e.to_string()))?;
    let params = [Value::String(schema.to_string())];

    let mut tables: BTreeMap<String, TableInfo> = catalog_query(conn, TABLES_SQL, &params)
        .await?
        .rows
        .iter()
        .map(|row| {
            let name = text(row, "table_name");
            let table = TableInfo {
                name: name.clone(),
                ..TableInfo::default()
            };
            (name, table)
        })
        .collect();

    for row in &catalog_query(conn, COLUMNS_SQL, &params).await?.rows {
        if let Some(table) = tables.get_mut(&text(row, "table_name")) {
            table.columns.push(ColumnInfo {
                name: text(row, "column_name"),
                data_type: text(row, "data_type"),
                nullable: row
                    .get_by_name("is_nullable")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true),
            });
        }
    }

    for row in &catalog_query(conn, PRIMARY_KEYS_SQL, &params).await?.rows {
        if let Some(table) = tables.get_mut(&text(row, "table_name")) {
            table.primary_key.push(text(row, "column_name"));
        }
    }

    for row in &catalog_query(conn, SCHEMA_INDEXES_SQL, &params).await?.rows {
        if let Some(table) = tables.get_mut(&text(row, "table_name")) {
            table.indexes.push(index_from_row(row));
        }
    }

    tracing::debug!(table_count = tables.len(), "schema snapshot loaded");
    Ok(SchemaSnapshot {
        schema: schema.to_string(),
        tables: tables.into_values().collect(),
    })
}

/// Deduplicated, sorted table names with derived tables removed
pub fn normalize_table_names<S: AsRef<str>>(tables: &[S]) -> Vec<String> {
    tables
        .iter()
        .map(|t| t.as_ref())
        .filter(|t| !t.is_empty() && !t.starts_with('('))
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Approximate row counts and secondary indexes for the named tables
///
/// Unknown tables are absent from the result. An empty name list returns an
/// empty map without touching the session.
#[tracing::instrument(skip(conn, tables), fields(table_count = tables.len()))]
pub async fn fetch_table_stats<S: AsRef<str>>(
    conn: &dyn Connection,
    tables: &[S],
    schema: &str,
    timeout_ms: u64,
) -> ServiceResult<StatsMap> {
    let names = normalize_table_names(tables);
    if names.is_empty() {
        return Ok(StatsMap::new());
    }

    conn.set_statement_timeout(timeout_ms)
        .await
        .map_err(|e| ServiceError::Catalog(e.to_string()))?;

    let params = [
        Value::String(schema.to_string()),
        Value::Array(names.into_iter().map(Value::String).collect()),
    ];

    let mut stats = StatsMap::new();
    for row in &catalog_query(conn, ROW_COUNTS_SQL, &params).await?.rows {
        let rows = row
            .get_by_name("rows")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        stats.insert(
            text(row, "table_name"),
            TableStats {
                rows,
                indexes: Vec::new(),
            },
        );
    }

    for row in &catalog_query(conn, TABLE_INDEXES_SQL, &params).await?.rows {
        stats
            .entry(text(row, "table_name"))
            .or_default()
            .indexes
            .push(index_from_row(row));
    }

    Ok(stats)
}

/// Average column widths in bytes from `pg_stats`; empty when unavailable
pub async fn fetch_column_widths(
    conn: &dyn Connection,
    table: &str,
    schema: &str,
    timeout_ms: u64,
) -> ColumnWidths {
    let params = [
        Value::String(schema.to_string()),
        Value::String(table.to_string()),
    ];
    let widths = async {
        conn.set_statement_timeout(timeout_ms).await?;
        conn.query(COLUMN_WIDTHS_SQL, &params).await
    };
    match widths.await {
        Ok(result) => result
            .rows
            .iter()
            .filter_map(|row| {
                let width = row.get_by_name("avg_width")?.as_i64()?;
                Some((text(row, "attname"), width.max(0) as u64))
            })
            .collect(),
        Err(e) => {
            tracing::debug!(table = %table, error = %e, "column widths unavailable");
            ColumnWidths::new()
        }
    }
}
