//! Integration tests for the single-query pipeline

mod common;

use common::{MockConnection, RecordingMetrics, settings_with_what_if, with_orders_catalog};
use pretty_assertions::assert_eq;
use qeo_analyzer::{IndexTarget, SuggestionKind};
use qeo_services::{
    DataSources, OptimizeRequest, PlanSource, QueryAdvisor, Ranking, WhatIfStatus,
};
use std::sync::Arc;

const SQL: &str = "SELECT * FROM orders WHERE customer_id = 42";

fn customer_index_sql() -> String {
    IndexTarget::new("orders", vec!["customer_id".into()]).create_index_sql()
}

#[tokio::test]
async fn test_non_select_is_rejected_without_round_trips() {
    let (mock, conn) = MockConnection::new().into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(true, 8, 5.0));

    let report = advisor
        .optimize(&conn, &OptimizeRequest::new("DELETE FROM orders"))
        .await;

    assert!(!report.ok);
    assert_eq!(
        report.message,
        "Only SELECT statements are supported for optimization"
    );
    assert!(report.suggestions.is_empty());
    assert!(mock.query_log().is_empty());
}

#[tokio::test]
async fn test_cost_based_pipeline() {
    let (mock, conn) = with_orders_catalog(MockConnection::new())
        .with_baseline(100.0)
        .with_trial_cost(customer_index_sql(), 40.0)
        .into_shared();
    let metrics = Arc::new(RecordingMetrics::default());
    let advisor =
        QueryAdvisor::new(settings_with_what_if(true, 8, 5.0)).with_metrics(metrics.clone());

    let report = advisor.optimize(&conn, &OptimizeRequest::new(SQL)).await;

    assert!(report.ok);
    assert_eq!(report.message, "ok");
    assert_eq!(report.ranking, Ranking::CostBased);
    assert_eq!(report.what_if.trials, 1);
    assert_eq!(
        report.data_sources,
        DataSources {
            plan: PlanSource::Explain,
            stats: true,
        }
    );

    let top = &report.suggestions[0];
    assert_eq!(top.kind, SuggestionKind::Index);
    assert_eq!(top.title, "Index on orders(customer_id)");
    assert_eq!(top.est_cost_before, Some(100.0));
    assert_eq!(top.est_cost_delta, Some(60.0));
    assert_eq!(report.actual_top_k, report.suggestions.len());

    assert!(!report.plan_warnings.is_empty());
    assert_eq!(report.plan_metrics.as_ref().map(|m| m.seq_scans), Some(1));
    assert_eq!(metrics.trial_count(), 1);
    assert_eq!(mock.active_index(), None);
    assert_eq!(mock.queries_containing("FROM pg_stats"), 1);
}

#[tokio::test]
async fn test_explain_failure_still_reports() {
    let (_mock, conn) = with_orders_catalog(MockConnection::new())
        .with_failing_baseline()
        .into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(false, 8, 5.0));

    let report = advisor.optimize(&conn, &OptimizeRequest::new(SQL)).await;

    assert!(report.ok);
    assert_eq!(report.data_sources.plan, PlanSource::None);
    assert!(report.plan_metrics.is_none());
    assert!(report.plan_warnings.is_empty());
    assert_eq!(report.ranking, Ranking::Heuristic);
    assert!(report.suggestions.iter().any(|s| s.is_index()));
}

#[tokio::test]
async fn test_what_if_failure_falls_back_to_heuristic() {
    let (_mock, conn) = with_orders_catalog(MockConnection::new())
        .with_failing_baseline()
        .into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(true, 8, 5.0));

    let report = advisor.optimize(&conn, &OptimizeRequest::new(SQL)).await;

    assert!(report.ok);
    assert_eq!(report.ranking, Ranking::Heuristic);
    assert_eq!(report.what_if, WhatIfStatus::unavailable());
    assert!(report.suggestions.iter().all(|s| s.est_cost_delta.is_none()));
}

#[tokio::test]
async fn test_request_can_opt_out_of_what_if() {
    let (mock, conn) = with_orders_catalog(MockConnection::new()).into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(true, 8, 5.0));

    let report = advisor
        .optimize(&conn, &OptimizeRequest::new(SQL).with_what_if(false))
        .await;

    assert_eq!(report.what_if, WhatIfStatus::disabled());
    assert_eq!(mock.queries_containing("hypopg"), 0);
}

#[tokio::test]
async fn test_top_k_truncates() {
    let (_mock, conn) = with_orders_catalog(MockConnection::new()).into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(false, 8, 5.0));

    let report = advisor
        .optimize(&conn, &OptimizeRequest::new(SQL).with_top_k(1))
        .await;

    assert_eq!(report.suggestions.len(), 1);
    assert_eq!(report.actual_top_k, 1);
}

#[tokio::test]
async fn test_analyze_uses_explain_analyze() {
    let (mock, conn) = with_orders_catalog(MockConnection::new()).into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(false, 8, 5.0));

    let report = advisor
        .optimize(
            &conn,
            &OptimizeRequest::new(SQL).with_analyze(true).with_timeout_ms(900),
        )
        .await;

    assert_eq!(report.data_sources.plan, PlanSource::ExplainAnalyze);
    assert_eq!(mock.queries_containing("ANALYZE, BUFFERS, TIMING"), 1);
    assert!(mock.timeouts().iter().all(|t| *t == 900));

    let log = mock.query_log();
    for pattern in ["FROM information_schema.tables", "FROM pg_stats"] {
        let at = log.iter().position(|sql| sql.contains(pattern)).unwrap();
        assert_eq!(log[at - 1], "SET statement_timeout = 900");
    }
}

#[tokio::test]
async fn test_catalog_failure_drops_index_suggestions() {
    let (_mock, conn) = MockConnection::new().with_failing_catalog().into_shared();
    let advisor = QueryAdvisor::new(settings_with_what_if(false, 8, 5.0));

    let report = advisor.optimize(&conn, &OptimizeRequest::new(SQL)).await;

    assert!(report.ok);
    assert!(!report.data_sources.stats);
    assert!(report.suggestions.iter().all(|s| !s.is_index()));
}
