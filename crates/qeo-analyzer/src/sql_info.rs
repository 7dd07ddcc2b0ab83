//! Static statement analysis
//!
//! Extracts the facts the heuristic advisor works from: referenced tables,
//! WHERE conjuncts split into equality and range predicates, join keys,
//! ORDER BY / GROUP BY keys and an integer LIMIT. Unquoted identifiers are
//! folded to lower case the way PostgreSQL folds them.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, Query,
    Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, Value as SqlValue,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Name recorded for derived tables in FROM
pub const DERIVED_TABLE: &str = "(subquery)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
    /// The SQL did not parse
    Unparsed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table name or alias the column was qualified with
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(qualifier: Option<&str>, name: &str) -> Self {
        Self {
            qualifier: qualifier.map(String::from),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKey {
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementInfo {
    pub kind: StatementKind,
    /// Top-level FROM entries in order of appearance
    pub tables: Vec<TableRef>,
    pub has_wildcard: bool,
    /// WHERE conjuncts as SQL text
    pub filters: Vec<String>,
    /// Columns compared with `=` against a constant
    pub equality_columns: Vec<ColumnRef>,
    /// Columns compared with `<`, `<=`, `>`, `>=` or BETWEEN
    pub range_columns: Vec<ColumnRef>,
    /// Column pairs equated in JOIN ... ON or WHERE
    pub join_keys: Vec<JoinKey>,
    /// ORDER BY items as SQL text
    pub order_by: Vec<String>,
    pub order_by_columns: Vec<ColumnRef>,
    /// GROUP BY items as SQL text
    pub group_by: Vec<String>,
    pub group_by_columns: Vec<ColumnRef>,
    /// Integer LIMIT, if any
    pub limit: Option<u64>,
    pub has_in_subquery: bool,
    pub has_exists_subquery: bool,
}

impl StatementInfo {
    fn empty(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: Vec::new(),
            has_wildcard: false,
            filters: Vec::new(),
            equality_columns: Vec::new(),
            range_columns: Vec::new(),
            join_keys: Vec::new(),
            order_by: Vec::new(),
            order_by_columns: Vec::new(),
            group_by: Vec::new(),
            group_by_columns: Vec::new(),
            limit: None,
            has_in_subquery: false,
            has_exists_subquery: false,
        }
    }

    pub fn is_select(&self) -> bool {
        self.kind == StatementKind::Select
    }

    /// Referenced table names in order, without duplicates
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            if !names.contains(&table.name) {
                names.push(table.name.clone());
            }
        }
        names
    }

    /// Resolves an alias or table name to the table it refers to
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.alias.as_deref() == Some(qualifier))
            .or_else(|| {
                self.tables.iter().find(|t| {
                    t.name == qualifier || t.name.rsplit('.').next() == Some(qualifier)
                })
            })
            .map(|t| t.name.as_str())
    }

    /// Whether a column reference can belong to `table`.
    ///
    /// Unqualified columns are attributed to every table.
    pub fn column_belongs_to(&self, column: &ColumnRef, table: &str) -> bool {
        match column.qualifier.as_deref() {
            None => true,
            Some(q) => self.resolve_qualifier(q) == Some(table),
        }
    }
}

/// Analyzes the first statement of `sql`. Never fails: SQL that does not
/// parse yields [`StatementKind::Unparsed`].
pub fn analyze_statement(sql: &str) -> StatementInfo {
    let statements = match Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        Ok(stmts) => stmts,
        Err(err) => {
            tracing::debug!(error = %err, "statement did not parse");
            return StatementInfo::empty(StatementKind::Unparsed);
        }
    };

    let Some(statement) = statements.first() else {
        return StatementInfo::empty(StatementKind::Unparsed);
    };

    match statement {
        Statement::Query(query) => {
            let mut info = StatementInfo::empty(StatementKind::Select);
            collect_query(query, &mut info);
            info
        }
        Statement::Insert(_) => StatementInfo::empty(StatementKind::Insert),
        Statement::Update { .. } => StatementInfo::empty(StatementKind::Update),
        Statement::Delete(_) => StatementInfo::empty(StatementKind::Delete),
        _ => StatementInfo::empty(StatementKind::Other),
    }
}

fn collect_query(query: &Query, info: &mut StatementInfo) {
    match query.body.as_ref() {
        SetExpr::Select(select) => collect_select(select, info),
        SetExpr::Query(inner) => collect_query(inner, info),
        _ => {}
    }

    if let Some(order_by) = &query.order_by {
        for item in &order_by.exprs {
            info.order_by.push(item.to_string());
            if let Some(col) = column_ref(&item.expr) {
                info.order_by_columns.push(col);
            }
        }
    }

    if let Some(Expr::Value(SqlValue::Number(n, _))) = &query.limit {
        info.limit = n.parse::<u64>().ok();
    }
}

fn collect_select(select: &Select, info: &mut StatementInfo) {
    info.has_wildcard = select
        .projection
        .iter()
        .any(|item| matches!(item, SelectItem::Wildcard(_)));

    for table_with_joins in &select.from {
        collect_from(table_with_joins, info);
    }

    if let Some(selection) = &select.selection {
        scan_subqueries(selection, info);
        for conjunct in conjuncts(selection) {
            info.filters.push(conjunct.to_string());
            classify_predicate(conjunct, info);
        }
    }

    if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
        for expr in exprs {
            info.group_by.push(expr.to_string());
            if let Some(col) = column_ref(expr) {
                info.group_by_columns.push(col);
            }
        }
    }
}

fn collect_from(table_with_joins: &TableWithJoins, info: &mut StatementInfo) {
    collect_table_factor(&table_with_joins.relation, info);

    for join in &table_with_joins.joins {
        collect_table_factor(&join.relation, info);
        if let Some(condition) = join_condition(&join.join_operator) {
            for conjunct in conjuncts(condition) {
                if let Some(key) = join_key(conjunct) {
                    info.join_keys.push(key);
                }
            }
        }
    }
}

fn collect_table_factor(factor: &TableFactor, info: &mut StatementInfo) {
    match factor {
        TableFactor::Table { name, alias, .. } => info.tables.push(TableRef {
            name: object_name(name),
            alias: alias.as_ref().map(|a| ident(&a.name)),
        }),
        TableFactor::Derived { alias, .. } => info.tables.push(TableRef {
            name: DERIVED_TABLE.to_string(),
            alias: alias.as_ref().map(|a| ident(&a.name)),
        }),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => collect_from(table_with_joins, info),
        _ => {}
    }
}

fn join_condition(operator: &JoinOperator) -> Option<&Expr> {
    let constraint = match operator {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c) => c,
        _ => return None,
    };
    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

/// Splits an expression on top-level AND
fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let mut out = conjuncts(left);
            out.extend(conjuncts(right));
            out
        }
        Expr::Nested(inner)
            if matches!(
                inner.as_ref(),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            conjuncts(inner)
        }
        other => vec![other],
    }
}

fn classify_predicate(expr: &Expr, info: &mut StatementInfo) {
    match expr {
        Expr::Nested(inner) => classify_predicate(inner, info),
        Expr::BinaryOp { left, op, right } => {
            let is_range = matches!(
                op,
                BinaryOperator::Lt
                    | BinaryOperator::LtEq
                    | BinaryOperator::Gt
                    | BinaryOperator::GtEq
            );
            if *op == BinaryOperator::Eq {
                if let Some(key) = join_key(expr) {
                    info.join_keys.push(key);
                } else if let Some(col) = column_against_constant(left, right) {
                    info.equality_columns.push(col);
                }
            } else if is_range && let Some(col) = column_against_constant(left, right) {
                info.range_columns.push(col);
            }
        }
        Expr::Between { expr, .. } => {
            if let Some(col) = column_ref(expr) {
                info.range_columns.push(col);
            }
        }
        _ => {}
    }
}

fn join_key(expr: &Expr) -> Option<JoinKey> {
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return None;
    };
    Some(JoinKey {
        left: column_ref(left)?,
        right: column_ref(right)?,
    })
}

fn column_against_constant(left: &Expr, right: &Expr) -> Option<ColumnRef> {
    match (column_ref(left), column_ref(right)) {
        (Some(col), None) if is_constant(right) => Some(col),
        (None, Some(col)) if is_constant(left) => Some(col),
        _ => None,
    }
}

fn is_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Value(_) | Expr::TypedString { .. } => true,
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::Cast { expr, .. } => {
            is_constant(expr)
        }
        _ => false,
    }
}

fn scan_subqueries(expr: &Expr, info: &mut StatementInfo) {
    match expr {
        Expr::InSubquery { expr, .. } => {
            info.has_in_subquery = true;
            scan_subqueries(expr, info);
        }
        Expr::Exists { .. } => info.has_exists_subquery = true,
        Expr::BinaryOp { left, right, .. } => {
            scan_subqueries(left, info);
            scan_subqueries(right, info);
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => scan_subqueries(expr, info),
        _ => {}
    }
}

fn column_ref(expr: &Expr) -> Option<ColumnRef> {
    match expr {
        Expr::Identifier(id) => Some(ColumnRef {
            qualifier: None,
            name: ident(id),
        }),
        Expr::CompoundIdentifier(parts) if parts.len() >= 2 => {
            let name = ident(&parts[parts.len() - 1]);
            let qualifier = ident(&parts[parts.len() - 2]);
            Some(ColumnRef {
                qualifier: Some(qualifier),
                name,
            })
        }
        Expr::Nested(inner) => column_ref(inner),
        _ => None,
    }
}

fn ident(id: &Ident) -> String {
    if id.quote_style.is_some() {
        id.value.clone()
    } else {
        id.value.to_lowercase()
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0.iter().map(ident).collect::<Vec<_>>().join(".")
}
