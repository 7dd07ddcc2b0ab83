//! Workload aggregation
//!
//! Runs the single-query pipeline over a batch and merges the index
//! suggestions that several queries agree on.

use qeo_analyzer::ranking::round3;
use qeo_analyzer::{Suggestion, SuggestionKind, analyze_statement};
use qeo_core::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::advisor_service::{OptimizeRequest, QueryAdvisor};

/// Outcome for one statement of the workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerQuery {
    Analyzed {
        sql: String,
        suggestions: Vec<Suggestion>,
    },
    Skipped {
        sql: String,
        skipped: bool,
    },
}

impl PerQuery {
    pub fn skipped(sql: impl Into<String>) -> Self {
        Self::Skipped {
            sql: sql.into(),
            skipped: true,
        }
    }

    pub fn sql(&self) -> &str {
        match self {
            Self::Analyzed { sql, .. } | Self::Skipped { sql, .. } => sql,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadResult {
    pub suggestions: Vec<Suggestion>,
    pub per_query: Vec<PerQuery>,
}

pub struct WorkloadAggregator {
    advisor: QueryAdvisor,
}

impl WorkloadAggregator {
    pub fn new(advisor: QueryAdvisor) -> Self {
        Self { advisor }
    }

    /// Analyze every statement serially on one session.
    ///
    /// `what_if` enables the evaluator per query when settings also enable it.
    #[tracing::instrument(skip(self, conn, sqls), fields(query_count = sqls.len()))]
    pub async fn analyze_workload(
        &self,
        conn: &Arc<dyn Connection>,
        sqls: &[String],
        top_k: usize,
        what_if: bool,
    ) -> WorkloadResult {
        let per_query_top_k = self.advisor.settings().read().optimizer.top_k;

        let mut collected = Vec::new();
        let mut per_query = Vec::with_capacity(sqls.len());
        for sql in sqls {
            if !analyze_statement(sql).is_select() {
                per_query.push(PerQuery::skipped(sql.clone()));
                continue;
            }

            let request = OptimizeRequest::new(sql.clone())
                .with_top_k(per_query_top_k)
                .with_what_if(what_if);
            let report = self.advisor.optimize(conn, &request).await;
            collected.extend(report.suggestions.iter().cloned());
            per_query.push(PerQuery::Analyzed {
                sql: sql.clone(),
                suggestions: report.suggestions,
            });
        }

        let suggestions = merge_index_suggestions(&collected, top_k);
        tracing::info!(
            merged = suggestions.len(),
            skipped = per_query.iter().filter(|q| q.is_skipped()).count(),
            "workload analyzed"
        );
        WorkloadResult {
            suggestions,
            per_query,
        }
    }
}

/// Group index suggestions by title, summing scores and counting queries.
///
/// The first occurrence of a title provides every other field.
pub fn merge_index_suggestions(suggestions: &[Suggestion], top_k: usize) -> Vec<Suggestion> {
    let mut merged: Vec<Suggestion> = Vec::new();
    let mut by_title: HashMap<&str, usize> = HashMap::new();

    for s in suggestions.iter().filter(|s| s.kind == SuggestionKind::Index) {
        let idx = *by_title.entry(s.title.as_str()).or_insert_with(|| {
            let mut first = s.clone();
            first.frequency = Some(0);
            first.score = Some(0.0);
            merged.push(first);
            merged.len() - 1
        });
        let entry = &mut merged[idx];
        entry.frequency = Some(entry.frequency.unwrap_or(0) + 1);
        entry.score = Some(round3(
            entry.score.unwrap_or(0.0) + s.score.unwrap_or(0.0),
        ));
    }

    merged.sort_by(|a, b| {
        let score = |s: &Suggestion| s.score.unwrap_or(0.0);
        score(b)
            .total_cmp(&score(a))
            .then_with(|| b.frequency.cmp(&a.frequency))
            .then_with(|| a.title.cmp(&b.title))
    });
    merged.truncate(top_k);
    merged
}
