//! Integration tests for the hypothetical index evaluator

mod common;

use common::{MockConnection, RecordingMetrics, settings_with_what_if};
use pretty_assertions::assert_eq;
use qeo_analyzer::{Impact, IndexTarget, Suggestion};
use qeo_services::{
    Ranking, ServiceError, SkipReason, TrialOutcome, WhatIfEvaluator, WhatIfStatus,
    run_explain_costs, total_cost,
};
use std::sync::Arc;
use std::time::Duration;

const SQL: &str = "SELECT * FROM orders WHERE customer_id = 42";

fn index_on(table: &str, columns: &[&str], score: f64) -> Suggestion {
    let target = IndexTarget::new(table, columns.iter().map(|c| c.to_string()).collect());
    Suggestion::index(format!("Index on {}", target), "filter columns")
        .with_statement(target.create_index_sql())
        .with_index_target(target)
        .with_score(score)
}

fn create_sql(table: &str, columns: &[&str]) -> String {
    IndexTarget::new(table, columns.iter().map(|c| c.to_string()).collect()).create_index_sql()
}

#[tokio::test]
async fn test_measured_candidate_is_enriched() {
    let (mock, conn) = MockConnection::new()
        .with_baseline(120.0)
        .with_trial_cost(create_sql("orders", &["customer_id"]), 80.0)
        .into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));

    let result = evaluator
        .evaluate(&conn, SQL, vec![index_on("orders", &["customer_id"], 0.6)], 1_000)
        .await
        .unwrap();

    assert_eq!(result.ranking, Ranking::CostBased);
    assert_eq!(
        result.what_if,
        WhatIfStatus {
            enabled: true,
            available: true,
            trials: 1,
            filtered_by_pct: 0,
        }
    );
    assert_eq!(result.suggestions.len(), 1);
    let s = &result.suggestions[0];
    assert_eq!(s.est_cost_before, Some(120.0));
    assert_eq!(s.est_cost_after, Some(80.0));
    assert_eq!(s.est_cost_delta, Some(40.0));
    assert_eq!(mock.active_index(), None);
    assert_eq!(mock.hypothetical_created(), 1);
}

#[tokio::test]
async fn test_missing_extension_keeps_input() {
    let (mock, conn) = MockConnection::new().without_extension().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));
    let input = vec![
        index_on("orders", &["customer_id"], 0.6),
        Suggestion::rewrite("Avoid SELECT *", "list the columns"),
    ];

    let result = evaluator.evaluate(&conn, SQL, input.clone(), 1_000).await.unwrap();

    assert_eq!(result.ranking, Ranking::Heuristic);
    assert_eq!(result.what_if, WhatIfStatus::unavailable());
    assert_eq!(result.suggestions, input);
    assert_eq!(mock.queries_containing("EXPLAIN"), 0);
    assert_eq!(
        serde_json::to_value(&result).unwrap()["whatIf"],
        serde_json::json!({"enabled": true, "available": false, "trials": 0, "filteredByPct": 0})
    );
}

#[tokio::test]
async fn test_disabled_makes_no_round_trips() {
    let (mock, conn) = MockConnection::new().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(false, 8, 10.0));
    let input = vec![index_on("orders", &["customer_id"], 0.6)];

    let result = evaluator.evaluate(&conn, SQL, input.clone(), 1_000).await.unwrap();

    assert_eq!(result.ranking, Ranking::Heuristic);
    assert_eq!(result.what_if, WhatIfStatus::disabled());
    assert_eq!(result.suggestions, input);
    assert!(mock.query_log().is_empty());
}

#[tokio::test]
async fn test_unparseable_statement_is_skipped() {
    let (mock, conn) = MockConnection::new().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));
    let input = vec![Suggestion::index("Broken", "").with_statement("CREATE INDEX foo")];

    let result = evaluator.evaluate(&conn, SQL, input.clone(), 1_000).await.unwrap();

    assert_eq!(result.trials(), 0);
    assert_eq!(result.suggestions, input);
    assert_eq!(result.trial_log.len(), 1);
    assert_eq!(
        result.trial_log[0].outcome,
        TrialOutcome::Skipped(SkipReason::Unparseable)
    );
    assert_eq!(mock.hypothetical_created(), 0);
}

#[tokio::test]
async fn test_failed_baseline_is_an_error() {
    let (_mock, conn) = MockConnection::new().with_failing_baseline().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));

    let err = evaluator
        .evaluate(&conn, SQL, vec![index_on("orders", &["customer_id"], 0.6)], 1_000)
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::BaselineMeasurement(_)));
}

#[tokio::test]
async fn test_trials_are_capped() {
    let (mock, conn) = MockConnection::new().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 2, 0.0));
    let input = vec![
        index_on("orders", &["a"], 0.9),
        index_on("orders", &["b"], 0.8),
        index_on("orders", &["c"], 0.7),
    ];

    let result = evaluator.evaluate(&conn, SQL, input, 1_000).await.unwrap();

    assert_eq!(result.trials(), 2);
    assert_eq!(mock.hypothetical_created(), 2);
    assert_eq!(result.suggestions.len(), 3);
    let untrialed = result
        .suggestions
        .iter()
        .find(|s| s.title == "Index on orders(c)")
        .unwrap();
    assert_eq!(untrialed.est_cost_delta, None);
}

#[tokio::test]
async fn test_non_index_suggestions_pass_through() {
    let (mock, conn) = MockConnection::new()
        .with_trial_cost(create_sql("orders", &["customer_id"]), 50.0)
        .into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));
    let rewrite = Suggestion::rewrite("Avoid SELECT *", "list the columns").with_score(0.2);

    let result = evaluator
        .evaluate(
            &conn,
            SQL,
            vec![rewrite.clone(), index_on("orders", &["customer_id"], 0.6)],
            1_000,
        )
        .await
        .unwrap();

    assert_eq!(mock.hypothetical_created(), 1);
    assert_eq!(result.suggestions.len(), 2);
    // measured index suggestions rank ahead of the rewrite
    assert_eq!(result.suggestions[0].title, "Index on orders(customer_id)");
    assert_eq!(result.suggestions[1], rewrite);
}

#[tokio::test]
async fn test_threshold_filters_and_reports() {
    let (_mock, conn) = MockConnection::new()
        .with_baseline(100.0)
        .with_trial_cost(create_sql("orders", &["a"]), 90.0)
        .with_trial_cost(create_sql("orders", &["b"]), 90.001)
        .into_shared();
    let metrics = Arc::new(RecordingMetrics::default());
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0))
        .with_metrics(metrics.clone());

    let result = evaluator
        .evaluate(
            &conn,
            SQL,
            vec![index_on("orders", &["a"], 0.5), index_on("orders", &["b"], 0.5)],
            1_000,
        )
        .await
        .unwrap();

    let titles: Vec<&str> = result.suggestions.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Index on orders(a)"]);
    assert_eq!(result.what_if.trials, 2);
    assert_eq!(result.what_if.filtered_by_pct, 1);
    assert_eq!(metrics.filtered_total(), 1);
    assert_eq!(metrics.trial_count(), 2);
}

#[tokio::test]
async fn test_failed_trial_still_resets() {
    let failing = create_sql("orders", &["a"]);
    let (mock, conn) = MockConnection::new()
        .with_failing_create(failing)
        .with_trial_cost(create_sql("orders", &["b"]), 40.0)
        .into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));

    let result = evaluator
        .evaluate(
            &conn,
            SQL,
            vec![index_on("orders", &["a"], 0.9), index_on("orders", &["b"], 0.5)],
            1_000,
        )
        .await
        .unwrap();

    assert!(matches!(result.trial_log[0].outcome, TrialOutcome::Failed(_)));
    assert!(matches!(result.trial_log[1].outcome, TrialOutcome::Measured { .. }));
    assert_eq!(result.trials(), 1);
    assert_eq!(result.ranking, Ranking::CostBased);
    assert_eq!(result.suggestions[0].title, "Index on orders(b)");
    assert_eq!(result.suggestions[1].est_cost_delta, None);
    assert_eq!(mock.active_index(), None);
}

#[tokio::test]
async fn test_cancelled_trial_leaves_no_index() {
    let (mock, conn) = MockConnection::new()
        .with_baseline(120.0)
        .with_hanging_trials()
        .into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        evaluator.evaluate(&conn, SQL, vec![index_on("orders", &["customer_id"], 0.6)], 1_000),
    )
    .await;
    assert!(outcome.is_err());
    assert_eq!(mock.hypothetical_created(), 1);
    assert_eq!(mock.deferred(), vec!["SELECT hypopg_reset()".to_string()]);

    // The next statement on the session sees no hypothetical index
    let plan = run_explain_costs(conn.as_ref(), SQL, 1_000).await.unwrap();
    assert_eq!(total_cost(&plan.plan), 120.0);
    assert_eq!(mock.active_index(), None);
    assert!(mock.deferred().is_empty());
}

#[tokio::test]
async fn test_rewrites_only_keep_input_order() {
    let (mock, conn) = MockConnection::new().with_baseline(120.0).into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 10.0));
    let input = vec![
        Suggestion::rewrite("Zeta", "").with_impact(Impact::Low).with_score(0.1),
        Suggestion::rewrite("Alpha", "").with_impact(Impact::High).with_score(0.9),
    ];

    let result = evaluator.evaluate(&conn, SQL, input.clone(), 1_000).await.unwrap();

    assert_eq!(result.suggestions, input);
    assert_eq!(result.ranking, Ranking::Heuristic);
    assert_eq!(
        result.what_if,
        WhatIfStatus {
            enabled: true,
            available: true,
            trials: 0,
            filtered_by_pct: 0,
        }
    );
    assert!(result.trial_log.is_empty());
    assert_eq!(mock.hypothetical_created(), 0);
}

#[tokio::test]
async fn test_repeated_evaluations_are_identical() {
    let (mock, conn) = MockConnection::new()
        .with_baseline(200.0)
        .with_trial_cost(create_sql("orders", &["a"]), 150.0)
        .with_trial_cost(create_sql("orders", &["b"]), 120.0)
        .into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 5.0));
    let input = vec![index_on("orders", &["a"], 0.9), index_on("orders", &["b"], 0.5)];

    let first = evaluator.evaluate(&conn, SQL, input.clone(), 1_000).await.unwrap();
    let second = evaluator.evaluate(&conn, SQL, input, 1_000).await.unwrap();

    assert_eq!(first.suggestions, second.suggestions);
    assert_eq!(first.what_if, second.what_if);
    assert_eq!(first.suggestions[0].title, "Index on orders(b)");
    assert_eq!(first.suggestions[0].est_cost_delta, Some(80.0));
    assert_eq!(mock.active_index(), None);
}

#[tokio::test]
async fn test_every_trial_is_bracketed_by_resets() {
    let (mock, conn) = MockConnection::new().into_shared();
    let evaluator = WhatIfEvaluator::new(settings_with_what_if(true, 8, 0.0));

    evaluator
        .evaluate(&conn, SQL, vec![index_on("orders", &["a"], 0.5)], 750)
        .await
        .unwrap();

    let log: Vec<String> = mock
        .query_log()
        .into_iter()
        .filter(|sql| !sql.starts_with("SET"))
        .collect();
    assert!(log[0].contains("pg_extension"));
    assert!(log[1].starts_with("EXPLAIN (FORMAT JSON, COSTS ON, TIMING OFF)"));
    assert_eq!(log[2], "SELECT hypopg_reset()");
    assert!(log[3].starts_with("SELECT * FROM hypopg_create_index"));
    assert!(log[4].starts_with("EXPLAIN"));
    assert_eq!(log[5], "SELECT hypopg_reset()");
    assert!(mock.timeouts().iter().all(|t| *t == 750));
}
