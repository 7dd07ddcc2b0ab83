//! Cost-based what-if evaluation with hypothetical indexes
//!
//! Each index candidate is materialized only inside the planner through the
//! `hypopg` extension, measured with a cost-only EXPLAIN and discarded again.
//! No real DDL is ever issued. Every trial runs on the caller's session, one
//! statement at a time, and leaves no hypothetical index behind, including
//! when the evaluation future is dropped mid-trial.

use qeo_analyzer::ranking::{round3, sort_cost_based};
use qeo_analyzer::{IndexTarget, Suggestion, SuggestionKind};
use qeo_core::{Connection, SharedSettings, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ServiceError, ServiceResult};
use crate::explain_client::{run_explain_costs, total_cost};
use crate::metrics::{AdvisorMetrics, TracingMetrics};

const EXTENSION_PROBE_SQL: &str = "SELECT extname FROM pg_extension WHERE extname = 'hypopg'";
const HYPOPG_RESET_SQL: &str = "SELECT hypopg_reset()";
const HYPOPG_CREATE_SQL: &str = "SELECT * FROM hypopg_create_index($1)";

/// Tolerance that keeps reductions sitting exactly on the threshold
const PCT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    Heuristic,
    CostBased,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfStatus {
    pub enabled: bool,
    pub available: bool,
    pub trials: usize,
    pub filtered_by_pct: usize,
}

impl WhatIfStatus {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Whether the session can create hypothetical indexes
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionStatus {
    Available,
    Missing,
    ProbeFailed(String),
}

impl ExtensionStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No structured target and no `ON table (cols)` clause in the statement
    Unparseable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Measured {
        cost_after: f64,
        delta: f64,
        elapsed: Duration,
    },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    pub title: String,
    pub outcome: TrialOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhatIfResult {
    pub ranking: Ranking,
    #[serde(rename = "whatIf")]
    pub what_if: WhatIfStatus,
    pub suggestions: Vec<Suggestion>,
    #[serde(skip)]
    pub trial_log: Vec<TrialRecord>,
}

impl WhatIfResult {
    fn heuristic(suggestions: Vec<Suggestion>, what_if: WhatIfStatus) -> Self {
        Self {
            ranking: Ranking::Heuristic,
            what_if,
            suggestions,
            trial_log: Vec::new(),
        }
    }

    pub fn trials(&self) -> usize {
        self.what_if.trials
    }
}

/// Resets hypothetical state when dropped while still armed.
///
/// The async [`HypoResetGuard::reset`] is the normal path. Dropping an armed
/// guard (the evaluation future was cancelled) queues the reset on the
/// session so it runs before the next statement. Sessions that cannot defer
/// statements get a reset spawned on the current runtime instead.
struct HypoResetGuard {
    conn: Option<Arc<dyn Connection>>,
}

impl HypoResetGuard {
    fn arm(conn: &Arc<dyn Connection>) -> Self {
        Self {
            conn: Some(Arc::clone(conn)),
        }
    }

    async fn reset(mut self) {
        if let Some(conn) = self.conn.take() {
            reset_hypothetical(conn.as_ref()).await;
        }
    }
}

impl Drop for HypoResetGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if conn.defer_statement(HYPOPG_RESET_SQL) {
            tracing::debug!("what-if trial cancelled, hypopg_reset queued on the session");
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!("what-if trial cancelled, scheduling hypopg_reset");
                handle.spawn(async move {
                    reset_hypothetical(conn.as_ref()).await;
                });
            }
            Err(_) => {
                tracing::warn!("no runtime available to reset hypothetical indexes");
            }
        }
    }
}

async fn reset_hypothetical(conn: &dyn Connection) {
    if let Err(e) = conn.query(HYPOPG_RESET_SQL, &[]).await {
        tracing::warn!(error = %e, "hypopg_reset failed");
    }
}

/// Probe for the `hypopg` extension on this session
pub async fn check_extension(conn: &dyn Connection, timeout_ms: u64) -> ExtensionStatus {
    let probe = async {
        conn.set_statement_timeout(timeout_ms).await?;
        conn.query(EXTENSION_PROBE_SQL, &[]).await
    };
    match probe.await {
        Ok(result) if result.has_rows() => ExtensionStatus::Available,
        Ok(_) => ExtensionStatus::Missing,
        Err(e) => ExtensionStatus::ProbeFailed(e.to_string()),
    }
}

pub struct WhatIfEvaluator {
    settings: SharedSettings,
    metrics: Arc<dyn AdvisorMetrics>,
}

impl WhatIfEvaluator {
    pub fn new(settings: SharedSettings) -> Self {
        Self {
            settings,
            metrics: Arc::new(TracingMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn AdvisorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Measure index candidates against the planner, then filter and rank.
    ///
    /// Only a failed baseline measurement is an error. Candidates that cannot
    /// be parsed or whose trial fails are kept unenriched and recorded in the
    /// trial log.
    #[tracing::instrument(skip_all, fields(candidates = suggestions.len(), timeout_ms = timeout_ms))]
    pub async fn evaluate(
        &self,
        conn: &Arc<dyn Connection>,
        sql: &str,
        mut suggestions: Vec<Suggestion>,
        timeout_ms: u64,
    ) -> ServiceResult<WhatIfResult> {
        let settings = self.settings.read().what_if.clone();

        if !settings.enabled {
            return Ok(WhatIfResult::heuristic(suggestions, WhatIfStatus::disabled()));
        }

        match check_extension(conn.as_ref(), timeout_ms).await {
            ExtensionStatus::Available => {}
            status => {
                tracing::info!(status = ?status, "hypopg unavailable, keeping heuristic ranking");
                return Ok(WhatIfResult::heuristic(
                    suggestions,
                    WhatIfStatus::unavailable(),
                ));
            }
        }

        let baseline = run_explain_costs(conn.as_ref(), sql, timeout_ms)
            .await
            .map_err(|e| ServiceError::BaselineMeasurement(e.to_string()))?;
        let baseline_cost = total_cost(&baseline.plan);

        let candidates: Vec<(String, Option<IndexTarget>)> = suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::Index)
            .take(settings.max_trials)
            .map(|s| (s.title.clone(), candidate_target(s)))
            .collect();

        if candidates.is_empty() {
            tracing::info!(baseline_cost, "no index candidates, keeping heuristic ranking");
            return Ok(WhatIfResult::heuristic(
                suggestions,
                WhatIfStatus {
                    enabled: true,
                    available: true,
                    ..WhatIfStatus::default()
                },
            ));
        }

        let mut trial_log = Vec::with_capacity(candidates.len());
        let mut trials = 0;
        for (title, target) in &candidates {
            let outcome = match target {
                Some(target) => {
                    self.run_trial(conn, sql, target, baseline_cost, timeout_ms)
                        .await
                }
                None => TrialOutcome::Skipped(SkipReason::Unparseable),
            };
            tracing::debug!(title = %title, outcome = ?outcome, "what-if trial finished");

            if let TrialOutcome::Measured {
                cost_after, delta, ..
            } = &outcome
            {
                trials += 1;
                enrich(&mut suggestions, title, baseline_cost, *cost_after, *delta);
            }
            trial_log.push(TrialRecord {
                title: title.clone(),
                outcome,
            });
        }

        let before = suggestions.len();
        suggestions.retain(|s| passes_threshold(s, baseline_cost, settings.min_cost_reduction_pct));
        let filtered_by_pct = before - suggestions.len();
        if filtered_by_pct > 0 {
            self.metrics.count_whatif_filtered(filtered_by_pct);
        }

        sort_cost_based(&mut suggestions);
        tracing::info!(
            baseline_cost,
            trials,
            filtered_by_pct,
            "what-if evaluation complete"
        );

        Ok(WhatIfResult {
            ranking: Ranking::CostBased,
            what_if: WhatIfStatus {
                enabled: true,
                available: true,
                trials,
                filtered_by_pct,
            },
            suggestions,
            trial_log,
        })
    }

    async fn run_trial(
        &self,
        conn: &Arc<dyn Connection>,
        sql: &str,
        target: &IndexTarget,
        baseline_cost: f64,
        timeout_ms: u64,
    ) -> TrialOutcome {
        let guard = HypoResetGuard::arm(conn);
        let measured = self.measure(conn.as_ref(), sql, target, timeout_ms).await;
        guard.reset().await;

        match measured {
            Ok((cost_after, elapsed)) => TrialOutcome::Measured {
                cost_after,
                delta: baseline_cost - cost_after,
                elapsed,
            },
            Err(reason) => TrialOutcome::Failed(reason),
        }
    }

    async fn measure(
        &self,
        conn: &dyn Connection,
        sql: &str,
        target: &IndexTarget,
        timeout_ms: u64,
    ) -> Result<(f64, Duration), String> {
        conn.set_statement_timeout(timeout_ms)
            .await
            .map_err(|e| e.to_string())?;
        conn.query(HYPOPG_RESET_SQL, &[])
            .await
            .map_err(|e| e.to_string())?;
        conn.query(
            HYPOPG_CREATE_SQL,
            &[Value::String(target.create_index_sql())],
        )
        .await
        .map_err(|e| e.to_string())?;

        let started = Instant::now();
        let plan = run_explain_costs(conn, sql, timeout_ms)
            .await
            .map_err(|e| e.to_string())?;
        let elapsed = started.elapsed();
        self.metrics.observe_whatif_trial(elapsed);

        Ok((total_cost(&plan.plan), elapsed))
    }
}

/// Structured target when the engine supplied one, else the statement text
fn candidate_target(suggestion: &Suggestion) -> Option<IndexTarget> {
    suggestion.index_target.clone().or_else(|| {
        suggestion
            .statements
            .first()
            .and_then(|statement| IndexTarget::parse_statement(statement))
    })
}

/// Only the first index suggestion with `title` receives the costs
fn enrich(suggestions: &mut [Suggestion], title: &str, before: f64, after: f64, delta: f64) {
    if let Some(s) = suggestions
        .iter_mut()
        .find(|s| s.kind == SuggestionKind::Index && s.title == title)
    {
        s.est_cost_before = Some(round3(before));
        s.est_cost_after = Some(round3(after));
        s.est_cost_delta = Some(round3(delta));
    }
}

/// Untrialed suggestions, non-positive deltas and a zero baseline always pass
fn passes_threshold(suggestion: &Suggestion, baseline_cost: f64, min_pct: f64) -> bool {
    match suggestion.est_cost_delta {
        Some(delta) if delta > 0.0 && baseline_cost > 0.0 => {
            let pct = delta / baseline_cost * 100.0;
            pct + PCT_EPSILON >= min_pct
        }
        _ => true,
    }
}
