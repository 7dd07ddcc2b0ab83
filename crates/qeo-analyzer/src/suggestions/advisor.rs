//! Heuristic advisor
//!
//! Deterministic rewrite and index suggestions from static statement facts
//! plus catalog metadata. Nothing here touches the database and no DDL is
//! ever produced for execution: index statements are text only.

use crate::sql_info::{ColumnRef, StatementInfo};
use crate::suggestions::ranking::{compare_heuristic, round3};
use crate::suggestions::{Impact, IndexTarget, Suggestion};
use qeo_core::{ColumnWidths, IndexInfo, OptimizerSettings, SchemaSnapshot, StatsMap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static IN_SUBQUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIN\s*\(\s*SELECT\b").expect("valid regex"));

static UNSAFE_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("valid regex"));

/// PostgreSQL identifier length limit
const MAX_IDENTIFIER_LEN: usize = 63;

/// Projected columns offered in place of `SELECT *`
const MAX_PROJECTED_COLUMNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorOptions {
    pub min_index_rows: u64,
    pub max_index_cols: usize,
    pub join_col_prior_boost: f64,
    pub index_max_width_bytes: u64,
    pub suppress_low_gain_pct: f64,
}

impl Default for AdvisorOptions {
    fn default() -> Self {
        Self::from(&OptimizerSettings::default())
    }
}

impl From<&OptimizerSettings> for AdvisorOptions {
    fn from(settings: &OptimizerSettings) -> Self {
        Self {
            min_index_rows: settings.min_rows_for_index,
            max_index_cols: settings.max_index_cols,
            join_col_prior_boost: settings.join_col_prior_boost,
            index_max_width_bytes: settings.index_max_width_bytes,
            suppress_low_gain_pct: settings.suppress_low_gain_pct,
        }
    }
}

/// Everything a suggestion engine may look at for one query
#[derive(Debug, Clone, Copy)]
pub struct AdvisorInput<'a> {
    pub sql: &'a str,
    pub statement: &'a StatementInfo,
    pub schema: &'a SchemaSnapshot,
    pub stats: &'a StatsMap,
    /// Average column widths keyed by table name
    pub column_widths: &'a BTreeMap<String, ColumnWidths>,
    pub options: &'a AdvisorOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorSummary {
    pub summary: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorOutput {
    pub suggestions: Vec<Suggestion>,
    pub summary: AdvisorSummary,
}

/// Produces candidate suggestions for a single query
pub trait SuggestionEngine: Send + Sync {
    fn suggest(&self, input: &AdvisorInput<'_>) -> AdvisorOutput;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAdvisor;

impl SuggestionEngine for HeuristicAdvisor {
    fn suggest(&self, input: &AdvisorInput<'_>) -> AdvisorOutput {
        let mut suggestions = suggest_rewrites(input.statement, input.schema);
        suggestions.extend(suggest_indexes(input));

        suggestions.sort_by(compare_heuristic);
        for s in &mut suggestions {
            s.confidence = round3(s.confidence);
            s.score = s.score.map(round3);
            s.est_reduction_pct = s.est_reduction_pct.map(round3);
        }

        let summary = summarize(&suggestions);
        AdvisorOutput {
            suggestions,
            summary,
        }
    }
}

pub fn suggest_rewrites(info: &StatementInfo, schema: &SchemaSnapshot) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    if info.has_wildcard {
        let projected: Vec<String> = info
            .tables
            .first()
            .and_then(|t| schema.table(relation_name(&t.name)))
            .map(|t| {
                t.columns
                    .iter()
                    .take(MAX_PROJECTED_COLUMNS)
                    .map(|c| c.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        let projection = if projected.is_empty() {
            "*".to_string()
        } else {
            projected.join(", ")
        };
        suggestions.push(
            Suggestion::rewrite(
                "Replace SELECT * with explicit columns",
                "Explicit projections reduce I/O and improve index-only scan chances.",
            )
            .with_impact(Impact::Low)
            .with_confidence(0.9)
            .with_alt_sql(format!(
                "-- Replace SELECT * with explicit projection\n/* projected */ SELECT {} FROM ...",
                projection
            )),
        );
    }

    if info.has_in_subquery
        && let Some(filter) = info.filters.iter().find(|f| IN_SUBQUERY.is_match(f))
    {
        let rewritten = IN_SUBQUERY.replace_all(filter, "EXISTS (SELECT");
        suggestions.push(
            Suggestion::rewrite(
                "Consider EXISTS instead of IN (subquery)",
                "EXISTS can short-circuit and avoid de-duplication work.",
            )
            .with_impact(Impact::Medium)
            .with_confidence(0.7)
            .with_alt_sql(format!("-- Example rewrite\n... WHERE {} ...", rewritten)),
        );
    }

    if info.has_exists_subquery {
        suggestions.push(
            Suggestion::rewrite(
                "Consider de-correlating subquery",
                "Unnest simple EXISTS subqueries to enable better join planning.",
            )
            .with_impact(Impact::Medium)
            .with_confidence(0.6)
            .with_alt_sql("-- Move correlated filters into JOIN conditions when equivalent"),
        );
    }

    if !info.order_by.is_empty() && info.limit.is_some() {
        suggestions.push(
            Suggestion::rewrite(
                "Align ORDER BY with index to support Top-N",
                "Matching order-by with an index enables early termination.",
            )
            .with_impact(Impact::Medium)
            .with_confidence(0.8)
            .with_alt_sql("-- Ensure leading index columns match ORDER BY direction"),
        );
    }

    if !info.filters.is_empty() && !info.group_by.is_empty() {
        suggestions.push(
            Suggestion::rewrite(
                "Push filters below GROUP BY/CTEs when safe",
                "Pushing predicates earlier reduces scanned rows before aggregation.",
            )
            .with_impact(Impact::Medium)
            .with_confidence(0.6)
            .with_alt_sql("-- Apply WHERE conditions inside subqueries to reduce input size"),
        );
    }

    suggestions
}

pub fn suggest_indexes(input: &AdvisorInput<'_>) -> Vec<Suggestion> {
    let info = input.statement;
    let options = input.options;
    let mut suggestions = Vec::new();

    for table in info.table_names() {
        if table.is_empty() || table.starts_with('(') {
            continue;
        }
        let relation = relation_name(&table);

        let rows = input.stats.get(relation).map(|s| s.rows).unwrap_or(0.0);
        if rows < options.min_index_rows as f64 {
            continue;
        }

        let columns_for = |refs: &[ColumnRef]| -> Vec<String> {
            dedupe(
                refs.iter()
                    .filter(|c| info.column_belongs_to(c, &table))
                    .map(|c| c.name.clone()),
            )
        };

        let mut join_cols = Vec::new();
        for key in &info.join_keys {
            for side in [&key.left, &key.right] {
                if info.column_belongs_to(side, &table) {
                    join_cols.push(side.name.clone());
                }
            }
        }
        let touches_join = !join_cols.is_empty();

        let eq_cols = dedupe(columns_for(&info.equality_columns).into_iter().chain(join_cols));
        let range_cols = columns_for(&info.range_columns);
        let order_cols = columns_for(&info.order_by_columns);
        let group_cols = columns_for(&info.group_by_columns);

        let mut ordered = dedupe(
            eq_cols
                .iter()
                .chain(&range_cols)
                .chain(&order_cols)
                .chain(&group_cols)
                .cloned(),
        );
        if ordered.is_empty() {
            continue;
        }
        ordered.truncate(options.max_index_cols);

        if existing_indexes(input, relation).any(|ix| index_covers(ix, &ordered)) {
            tracing::debug!(table = %table, columns = ?ordered, "existing index covers candidate");
            continue;
        }

        let widths = input.column_widths.get(relation);
        let est_width: u64 = ordered
            .iter()
            .filter_map(|c| widths.and_then(|w| w.get(c)))
            .sum();

        let mut score = 0.0;
        score += eq_cols.iter().filter(|c| ordered.contains(c)).count() as f64;
        score += 0.5 * range_cols.iter().filter(|c| ordered.contains(c)).count() as f64;
        score += 0.25
            * order_cols
                .iter()
                .chain(&group_cols)
                .filter(|c| ordered.contains(c))
                .count() as f64;
        if touches_join {
            score *= options.join_col_prior_boost;
        }
        if est_width > 0 {
            let penalty = (options.index_max_width_bytes as f64 / est_width as f64).sqrt();
            score *= penalty.max(0.1);
        }

        let est_pct = if rows > 0.0 {
            let order_bonus = if order_cols.is_empty() { 0.0 } else { 5.0 };
            (eq_cols.len() as f64 * 10.0 + order_bonus).min(100.0)
        } else {
            0.0
        };
        if est_pct < options.suppress_low_gain_pct {
            continue;
        }
        if est_width > options.index_max_width_bytes {
            continue;
        }

        let target = IndexTarget::new(table.clone(), ordered.clone());
        let statement = format!(
            "CREATE INDEX CONCURRENTLY {} ON {} ({})",
            index_name(&table, &ordered),
            target.table_sql(),
            target.columns_sql()
        );
        let impact = if !eq_cols.is_empty() && !order_cols.is_empty() {
            Impact::High
        } else {
            Impact::Medium
        };

        let mut suggestion = Suggestion::index(
            format!("Index on {}", target),
            "Supports equality, range, and ordering for faster lookups and Top-N.",
        )
        .with_impact(impact)
        .with_confidence(if order_cols.is_empty() { 0.6 } else { 0.7 })
        .with_statement(statement)
        .with_score(score)
        .with_index_target(target);
        suggestion.reason = Some(format!(
            "Boosts equality({}), range({}), order/group({})",
            eq_cols.len(),
            range_cols.len(),
            order_cols.len() + group_cols.len()
        ));
        suggestion.est_reduction_pct = Some(est_pct);
        suggestion.est_index_width_bytes = Some(est_width);
        suggestions.push(suggestion);
    }

    suggestions
}

/// Mean of impact weight times confidence over the first five suggestions
pub fn summarize(suggestions: &[Suggestion]) -> AdvisorSummary {
    let Some(top) = suggestions.first() else {
        return AdvisorSummary {
            summary: "No optimizations identified.".to_string(),
            score: 0.0,
        };
    };

    let head = &suggestions[..suggestions.len().min(5)];
    let total: f64 = head
        .iter()
        .map(|s| {
            let weight = match s.impact {
                Some(Impact::Low) => 0.2,
                Some(Impact::Medium) => 0.5,
                Some(Impact::High) => 0.8,
                None => 0.3,
            };
            weight * s.confidence
        })
        .sum();

    AdvisorSummary {
        summary: format!("Top suggestion: {}", top.title),
        score: round3(total / head.len() as f64),
    }
}

/// `idx_<table>_<cols>`, lower case, at most 63 characters
pub fn index_name(table: &str, columns: &[String]) -> String {
    let safe_table = UNSAFE_NAME_CHARS.replace_all(table, "_");
    let safe_cols: Vec<String> = columns
        .iter()
        .map(|c| UNSAFE_NAME_CHARS.replace_all(c, "_").into_owned())
        .collect();
    let name = format!("idx_{}_{}", safe_table, safe_cols.join("_")).to_lowercase();
    name.chars().take(MAX_IDENTIFIER_LEN).collect()
}

fn existing_indexes<'a>(
    input: &'a AdvisorInput<'_>,
    relation: &str,
) -> impl Iterator<Item = &'a IndexInfo> {
    let from_schema = input
        .schema
        .table(relation)
        .map(|t| t.indexes.as_slice())
        .unwrap_or_default();
    let from_stats = input
        .stats
        .get(relation)
        .map(|s| s.indexes.as_slice())
        .unwrap_or_default();
    from_schema.iter().chain(from_stats.iter())
}

/// An index covers the candidate when its leading columns equal the
/// candidate columns (case-insensitive)
fn index_covers(index: &IndexInfo, columns: &[String]) -> bool {
    index.columns.len() >= columns.len()
        && index
            .columns
            .iter()
            .zip(columns)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
}

fn relation_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

fn dedupe(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
