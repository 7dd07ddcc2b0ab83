//! Single-query optimization pipeline
//!
//! Static analysis, EXPLAIN, plan warnings, catalog lookups, the suggestion
//! engine and the optional what-if pass, each degrading on its own so a
//! report is always produced.

use qeo_analyzer::{
    AdvisorInput, AdvisorOptions, AdvisorSummary, HeuristicAdvisor, PlanInspector, PlanMetrics,
    PlanWarning, Suggestion, SuggestionEngine, analyze_statement,
};
use qeo_core::{ColumnWidths, Connection, SchemaSnapshot, SharedSettings, StatsMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::{fetch_column_widths, fetch_schema, fetch_table_stats, normalize_table_names};
use crate::explain_client::run_explain;
use crate::metrics::AdvisorMetrics;
use crate::whatif::{Ranking, WhatIfEvaluator, WhatIfStatus};

pub const DEFAULT_SCHEMA: &str = "public";

const NOT_A_SELECT: &str = "Only SELECT statements are supported for optimization";

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeRequest {
    pub sql: String,
    /// Use EXPLAIN ANALYZE, which executes the statement
    pub analyze: bool,
    /// Falls back to `optimizer.timeout_ms_default`
    pub timeout_ms: Option<u64>,
    /// Capped at `optimizer.top_k`
    pub top_k: Option<usize>,
    /// Opt out of the what-if pass even when settings enable it
    pub what_if: bool,
}

impl OptimizeRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            analyze: false,
            timeout_ms: None,
            top_k: None,
            what_if: true,
        }
    }

    pub fn with_analyze(mut self, analyze: bool) -> Self {
        self.analyze = analyze;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_what_if(mut self, what_if: bool) -> Self {
        self.what_if = what_if;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    None,
    Explain,
    ExplainAnalyze,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSources {
    pub plan: PlanSource,
    pub stats: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeReport {
    pub ok: bool,
    pub message: String,
    pub suggestions: Vec<Suggestion>,
    pub summary: AdvisorSummary,
    pub ranking: Ranking,
    pub what_if: WhatIfStatus,
    pub plan_warnings: Vec<PlanWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_metrics: Option<PlanMetrics>,
    pub data_sources: DataSources,
    pub actual_top_k: usize,
}

impl OptimizeReport {
    fn rejected(message: &str) -> Self {
        Self {
            ok: false,
            message: message.to_string(),
            suggestions: Vec::new(),
            summary: AdvisorSummary {
                summary: String::new(),
                score: 0.0,
            },
            ranking: Ranking::Heuristic,
            what_if: WhatIfStatus::disabled(),
            plan_warnings: Vec::new(),
            plan_metrics: None,
            data_sources: DataSources {
                plan: PlanSource::None,
                stats: false,
            },
            actual_top_k: 0,
        }
    }
}

/// Runs the optimization pipeline for one statement at a time
pub struct QueryAdvisor {
    settings: SharedSettings,
    engine: Arc<dyn SuggestionEngine>,
    evaluator: WhatIfEvaluator,
    inspector: PlanInspector,
    schema: String,
}

impl QueryAdvisor {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            evaluator: WhatIfEvaluator::new(settings.clone()),
            settings,
            engine: Arc::new(HeuristicAdvisor),
            inspector: PlanInspector::new(),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn SuggestionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn AdvisorMetrics>) -> Self {
        self.evaluator = self.evaluator.with_metrics(metrics);
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    #[tracing::instrument(skip(self, conn, request), fields(sql_preview = %request.sql.chars().take(100).collect::<String>(), analyze = request.analyze))]
    pub async fn optimize(
        &self,
        conn: &Arc<dyn Connection>,
        request: &OptimizeRequest,
    ) -> OptimizeReport {
        let settings = self.settings.read().clone();
        let timeout_ms = request
            .timeout_ms
            .unwrap_or(settings.optimizer.timeout_ms_default);

        let statement = analyze_statement(&request.sql);
        if !statement.is_select() {
            tracing::debug!(kind = ?statement.kind, "statement rejected");
            return OptimizeReport::rejected(NOT_A_SELECT);
        }

        let (plan_source, plan_warnings, plan_metrics) =
            match run_explain(conn.as_ref(), &request.sql, request.analyze, timeout_ms).await {
                Ok(output) => {
                    let (warnings, metrics) = self.inspector.inspect(&output.plan);
                    let source = if request.analyze {
                        PlanSource::ExplainAnalyze
                    } else {
                        PlanSource::Explain
                    };
                    (source, warnings, Some(metrics))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "EXPLAIN failed, continuing without a plan");
                    (PlanSource::None, Vec::new(), None)
                }
            };

        let schema = fetch_schema(conn.as_ref(), &self.schema, timeout_ms)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "schema snapshot unavailable");
                SchemaSnapshot::empty(&self.schema)
            });

        let relations: Vec<String> = statement
            .table_names()
            .iter()
            .map(|name| name.rsplit('.').next().unwrap_or(name).to_string())
            .collect();
        let (stats, stats_used) =
            match fetch_table_stats(conn.as_ref(), &relations, &self.schema, timeout_ms).await {
                Ok(stats) => (stats, true),
                Err(e) => {
                    tracing::warn!(error = %e, "table stats unavailable");
                    (StatsMap::new(), false)
                }
            };

        let options = AdvisorOptions::from(&settings.optimizer);
        let column_widths = self
            .load_column_widths(conn.as_ref(), &relations, &stats, &options, timeout_ms)
            .await;

        let output = self.engine.suggest(&AdvisorInput {
            sql: &request.sql,
            statement: &statement,
            schema: &schema,
            stats: &stats,
            column_widths: &column_widths,
            options: &options,
        });

        let limit = request
            .top_k
            .unwrap_or(settings.optimizer.top_k)
            .min(settings.optimizer.top_k);
        let mut suggestions = output.suggestions;
        suggestions.truncate(limit);

        let mut ranking = Ranking::Heuristic;
        let mut what_if = WhatIfStatus::disabled();
        if settings.what_if.enabled && request.what_if {
            match self
                .evaluator
                .evaluate(conn, &request.sql, suggestions.clone(), timeout_ms)
                .await
            {
                Ok(result) => {
                    ranking = result.ranking;
                    what_if = result.what_if;
                    suggestions = result.suggestions;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "what-if evaluation failed, keeping heuristic ranking");
                    what_if = WhatIfStatus::unavailable();
                }
            }
        }

        OptimizeReport {
            ok: true,
            message: "ok".to_string(),
            actual_top_k: suggestions.len(),
            suggestions,
            summary: output.summary,
            ranking,
            what_if,
            plan_warnings,
            plan_metrics,
            data_sources: DataSources {
                plan: plan_source,
                stats: stats_used,
            },
        }
    }

    /// Widths only for tables large enough to receive an index suggestion
    async fn load_column_widths(
        &self,
        conn: &dyn Connection,
        relations: &[String],
        stats: &StatsMap,
        options: &AdvisorOptions,
        timeout_ms: u64,
    ) -> BTreeMap<String, ColumnWidths> {
        let mut widths = BTreeMap::new();
        for relation in normalize_table_names(relations) {
            let large_enough = stats
                .get(&relation)
                .is_some_and(|s| s.rows >= options.min_index_rows as f64);
            if !large_enough {
                continue;
            }
            let table_widths = fetch_column_widths(conn, &relation, &self.schema, timeout_ms).await;
            if !table_widths.is_empty() {
                widths.insert(relation, table_widths);
            }
        }
        widths
    }
}
