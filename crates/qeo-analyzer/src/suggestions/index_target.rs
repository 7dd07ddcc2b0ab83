//! Index targets and the textual `CREATE INDEX` fallback parser

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static ON_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bON\s+((?:"[^"]+"|[A-Za-z0-9_]+)(?:\.(?:"[^"]+"|[A-Za-z0-9_]+))*)\s*\(([^)]+)\)"#,
    )
    .expect("valid regex")
});

static NAME_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]+"|[A-Za-z0-9_]+"#).expect("valid regex"));

static PLAIN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_$]*$").expect("valid regex"));

/// Table and key columns of a (hypothetical) index.
///
/// Names are stored unquoted, folded the way PostgreSQL folds them, and
/// are quoted again when rendered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTarget {
    /// Possibly schema-qualified, parts joined by `.`
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexTarget {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Recovers the target from `... ON <qualified_ident> (<col>[, <col>...])`.
    ///
    /// Returns `None` when the clause is missing or yields no columns.
    pub fn parse_statement(statement: &str) -> Option<Self> {
        let caps = ON_CLAUSE.captures(statement)?;

        let table = NAME_PART
            .find_iter(caps.get(1)?.as_str())
            .map(|m| unquote(m.as_str()))
            .collect::<Vec<_>>()
            .join(".");

        let columns: Vec<String> = caps
            .get(2)?
            .as_str()
            .split(',')
            .map(|c| unquote(c.trim()))
            .filter(|c| !c.is_empty())
            .collect();

        if table.is_empty() || columns.is_empty() {
            return None;
        }
        Some(Self { table, columns })
    }

    /// `CREATE INDEX ON <table> (<cols>)`, the statement given to the
    /// hypothetical index extension
    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX ON {} ({})",
            self.table_sql(),
            self.columns_sql()
        )
    }

    pub fn table_sql(&self) -> String {
        self.table
            .split('.')
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn columns_sql(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.table, self.columns.join(", "))
    }
}

/// Quoted names keep their case, bare names fold to lower case
fn unquote(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        trimmed.trim_matches('"').to_lowercase()
    }
}

pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
