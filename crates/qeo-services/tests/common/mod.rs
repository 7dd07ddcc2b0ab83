//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use qeo_core::{
    AdvisorSettings, Connection, QeoError, QueryResult, Result, SharedSettings, StatementResult,
    Value,
};
use qeo_services::AdvisorMetrics;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct MockState {
    active_index: Option<String>,
    hypothetical_created: usize,
    timeouts: Vec<u64>,
    query_log: Vec<String>,
    deferred: Vec<String>,
}

/// Mock session that emulates the planner side of `hypopg`.
///
/// EXPLAIN reports `baseline_cost` while no hypothetical index exists and the
/// registered trial cost (keyed by the `CREATE INDEX` text handed to
/// `hypopg_create_index`) while one does. Catalog queries are answered from
/// SQL-pattern-based responses like the driver-level mocks.
pub struct MockConnection {
    pub installed: bool,
    pub baseline_cost: f64,
    pub trial_costs: HashMap<String, f64>,
    pub fail_baseline: bool,
    pub fail_create: HashSet<String>,
    pub hang_trials: bool,
    pub explain_as_text: bool,
    pub fail_catalog: bool,
    /// EXPLAIN fails for statements containing one of these patterns
    pub fail_explain_for: Vec<String>,
    /// SQL-pattern-based responses: if a query contains the pattern string,
    /// the corresponding result is returned.
    pub query_responses: Vec<(String, QueryResult)>,
    state: Mutex<MockState>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            installed: true,
            baseline_cost: 100.0,
            trial_costs: HashMap::new(),
            fail_baseline: false,
            fail_create: HashSet::new(),
            hang_trials: false,
            explain_as_text: false,
            fail_catalog: false,
            fail_explain_for: Vec::new(),
            query_responses: Vec::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn without_extension(mut self) -> Self {
        self.installed = false;
        self
    }

    pub fn with_baseline(mut self, cost: f64) -> Self {
        self.baseline_cost = cost;
        self
    }

    /// Register the plan cost seen while `create_sql` is the active hypothetical index
    pub fn with_trial_cost(mut self, create_sql: impl Into<String>, cost: f64) -> Self {
        self.trial_costs.insert(create_sql.into(), cost);
        self
    }

    pub fn with_failing_create(mut self, create_sql: impl Into<String>) -> Self {
        self.fail_create.insert(create_sql.into());
        self
    }

    pub fn with_failing_baseline(mut self) -> Self {
        self.fail_baseline = true;
        self
    }

    pub fn with_hanging_trials(mut self) -> Self {
        self.hang_trials = true;
        self
    }

    pub fn with_text_explain(mut self) -> Self {
        self.explain_as_text = true;
        self
    }

    pub fn with_failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    pub fn with_failing_explain_for(mut self, sql_contains: impl Into<String>) -> Self {
        self.fail_explain_for.push(sql_contains.into());
        self
    }

    pub fn with_query_response(
        mut self,
        sql_contains: impl Into<String>,
        result: QueryResult,
    ) -> Self {
        self.query_responses.push((sql_contains.into(), result));
        self
    }

    pub fn into_shared(self) -> (Arc<MockConnection>, Arc<dyn Connection>) {
        let mock = Arc::new(self);
        let conn: Arc<dyn Connection> = mock.clone();
        (mock, conn)
    }

    pub fn active_index(&self) -> Option<String> {
        self.state.lock().active_index.clone()
    }

    pub fn hypothetical_created(&self) -> usize {
        self.state.lock().hypothetical_created
    }

    pub fn timeouts(&self) -> Vec<u64> {
        self.state.lock().timeouts.clone()
    }

    pub fn query_log(&self) -> Vec<String> {
        self.state.lock().query_log.clone()
    }

    pub fn deferred(&self) -> Vec<String> {
        self.state.lock().deferred.clone()
    }

    pub fn queries_containing(&self, pattern: &str) -> usize {
        self.query_log()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    fn plan_result(&self, cost: f64) -> QueryResult {
        let document = serde_json::json!([{
            "Plan": {
                "Node Type": "Seq Scan",
                "Relation Name": "orders",
                "Startup Cost": 0.0,
                "Total Cost": cost,
                "Plan Rows": 50000,
                "Filter": "(customer_id = 42)"
            },
            "Planning Time": 0.1
        }]);
        let value = if self.explain_as_text {
            Value::String(document.to_string())
        } else {
            Value::Json(document)
        };
        QueryResult::from_rows(vec!["QUERY PLAN".to_string()], vec![vec![value]])
    }

    /// Replay statements queued through `defer_statement`, like the driver
    /// does before each call
    fn run_deferred(&self) {
        let mut state = self.state.lock();
        for sql in std::mem::take(&mut state.deferred) {
            if sql == "SELECT hypopg_reset()" && self.installed {
                state.active_index = None;
            }
            state.query_log.push(sql);
        }
    }

    fn explain(&self, sql: &str) -> Result<(QueryResult, bool)> {
        if self.fail_explain_for.iter().any(|p| sql.contains(p.as_str())) {
            return Err(QeoError::Query("relation \"orders\" is locked".into()));
        }
        let active = self.state.lock().active_index.clone();
        match active {
            None if self.fail_baseline => Err(QeoError::Query("canceling statement due to statement timeout".into())),
            None => Ok((self.plan_result(self.baseline_cost), false)),
            Some(index) => {
                let cost = self
                    .trial_costs
                    .get(&index)
                    .copied()
                    .unwrap_or(self.baseline_cost);
                Ok((self.plan_result(cost), self.hang_trials))
            }
        }
    }
}

fn single(column: &str, value: Value) -> QueryResult {
    QueryResult::from_rows(vec![column.to_string()], vec![vec![value]])
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.run_deferred();
        let mut state = self.state.lock();
        state.query_log.push(sql.to_string());
        if let Some(ms) = sql.strip_prefix("SET statement_timeout = ") {
            state.timeouts.push(ms.trim().parse().unwrap_or(0));
        }
        Ok(StatementResult::default())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.run_deferred();
        self.state.lock().query_log.push(sql.to_string());

        if sql.contains("FROM pg_extension") {
            return Ok(if self.installed {
                single("extname", Value::String("hypopg".into()))
            } else {
                QueryResult::empty()
            });
        }

        if sql == "SELECT hypopg_reset()" {
            if !self.installed {
                return Err(QeoError::Query("function hypopg_reset() does not exist".into()));
            }
            self.state.lock().active_index = None;
            return Ok(single("hypopg_reset", Value::Null));
        }

        if sql.starts_with("SELECT * FROM hypopg_create_index") {
            let create_sql = params
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if self.fail_create.contains(&create_sql) {
                return Err(QeoError::Query(format!("cannot create hypothetical index: {}", create_sql)));
            }
            let mut state = self.state.lock();
            state.active_index = Some(create_sql);
            state.hypothetical_created += 1;
            return Ok(QueryResult::from_rows(
                vec!["indexrelid".into(), "indexname".into()],
                vec![vec![Value::Int64(13_543), Value::String("<13543>btree".into())]],
            ));
        }

        if sql.starts_with("EXPLAIN") {
            let (result, hang) = self.explain(sql)?;
            if hang {
                std::future::pending::<()>().await;
            }
            return Ok(result);
        }

        let is_catalog = sql.contains("information_schema")
            || sql.contains("pg_class")
            || sql.contains("pg_stats");
        if is_catalog && self.fail_catalog {
            return Err(QeoError::Query("permission denied for catalog".into()));
        }

        for (pattern, result) in &self.query_responses {
            if sql.contains(pattern.as_str()) {
                return Ok(result.clone());
            }
        }
        Ok(QueryResult::empty())
    }

    fn defer_statement(&self, sql: &str) -> bool {
        self.state.lock().deferred.push(sql.to_string());
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// Metrics port that records every observation
#[derive(Default)]
pub struct RecordingMetrics {
    pub trials: Mutex<Vec<Duration>>,
    pub filtered: Mutex<Vec<usize>>,
}

impl RecordingMetrics {
    pub fn trial_count(&self) -> usize {
        self.trials.lock().len()
    }

    pub fn filtered_total(&self) -> usize {
        self.filtered.lock().iter().sum()
    }
}

impl AdvisorMetrics for RecordingMetrics {
    fn observe_whatif_trial(&self, elapsed: Duration) {
        self.trials.lock().push(elapsed);
    }

    fn count_whatif_filtered(&self, count: usize) {
        self.filtered.lock().push(count);
    }
}

pub fn settings_with_what_if(enabled: bool, max_trials: usize, min_pct: f64) -> SharedSettings {
    let mut settings = AdvisorSettings::default();
    settings.what_if.enabled = enabled;
    settings.what_if.max_trials = max_trials;
    settings.what_if.min_cost_reduction_pct = min_pct;
    settings.shared()
}

/// Catalog responses for an `orders` table of 50k rows in `public`
pub fn with_orders_catalog(conn: MockConnection) -> MockConnection {
    let columns = ["id", "customer_id", "status", "created_at", "total"];
    conn.with_query_response(
        "FROM information_schema.tables",
        single("table_name", Value::String("orders".into())),
    )
    .with_query_response(
        "FROM information_schema.columns",
        QueryResult::from_rows(
            vec![
                "table_name".into(),
                "column_name".into(),
                "data_type".into(),
                "is_nullable".into(),
            ],
            columns
                .iter()
                .map(|c| {
                    vec![
                        Value::String("orders".into()),
                        Value::String((*c).into()),
                        Value::String("integer".into()),
                        Value::String("NO".into()),
                    ]
                })
                .collect(),
        ),
    )
    .with_query_response(
        "AND ix.indisprimary",
        QueryResult::from_rows(
            vec!["table_name".into(), "column_name".into()],
            vec![vec![Value::String("orders".into()), Value::String("id".into())]],
        ),
    )
    .with_query_response(
        "c.reltuples",
        QueryResult::from_rows(
            vec!["table_name".into(), "rows".into()],
            vec![vec![Value::String("orders".into()), Value::Int64(50_000)]],
        ),
    )
    .with_query_response(
        "FROM pg_stats",
        QueryResult::from_rows(
            vec!["attname".into(), "avg_width".into()],
            vec![
                vec![Value::String("customer_id".into()), Value::Int32(4)],
                vec![Value::String("created_at".into()), Value::Int32(8)],
            ],
        ),
    )
}
