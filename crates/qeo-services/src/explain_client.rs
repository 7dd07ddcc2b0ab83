//! EXPLAIN execution against a live session

use qeo_analyzer::{QueryPlan, normalize_explain_document, normalize_explain_text, plan_from_document};
use qeo_core::{Connection, Value};

use crate::error::{ServiceError, ServiceResult};

/// A normalized plan as returned by the planner
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainOutput {
    pub plan: QueryPlan,
}

impl ExplainOutput {
    /// The normalized `{"Plan": {...}}` document
    pub fn document(&self) -> &serde_json::Value {
        &self.plan.document
    }

    pub fn total_cost(&self) -> f64 {
        total_cost(&self.plan)
    }
}

/// Run `EXPLAIN (FORMAT JSON[, ANALYZE, BUFFERS, TIMING])` under a session timeout
#[tracing::instrument(skip(conn, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
pub async fn run_explain(
    conn: &dyn Connection,
    sql: &str,
    analyze: bool,
    timeout_ms: u64,
) -> ServiceResult<ExplainOutput> {
    let options = if analyze {
        "FORMAT JSON, ANALYZE, BUFFERS, TIMING"
    } else {
        "FORMAT JSON"
    };
    explain_with(conn, options, sql, timeout_ms).await
}

/// Cost-only EXPLAIN; never executes the statement
pub async fn run_explain_costs(
    conn: &dyn Connection,
    sql: &str,
    timeout_ms: u64,
) -> ServiceResult<ExplainOutput> {
    explain_with(conn, "FORMAT JSON, COSTS ON, TIMING OFF", sql, timeout_ms).await
}

/// Root `Total Cost`, or `0.0` when the planner reported none
pub fn total_cost(plan: &QueryPlan) -> f64 {
    plan.total_cost()
}

async fn explain_with(
    conn: &dyn Connection,
    options: &str,
    sql: &str,
    timeout_ms: u64,
) -> ServiceResult<ExplainOutput> {
    conn.set_statement_timeout(timeout_ms)
        .await
        .map_err(|e| ServiceError::Explain(e.to_string()))?;

    let result = conn
        .query(&format!("EXPLAIN ({}) {}", options, sql), &[])
        .await
        .map_err(|e| ServiceError::Explain(e.to_string()))?;

    let document = match result.scalar() {
        Some(Value::Json(json)) => normalize_explain_document(json.clone()),
        Some(Value::String(text)) => {
            normalize_explain_text(text).map_err(|e| ServiceError::Explain(e.to_string()))?
        }
        _ => serde_json::json!({ "Plan": {} }),
    };

    Ok(ExplainOutput {
        plan: plan_from_document(document),
    })
}
