//! Tests for PostgreSQL EXPLAIN normalization and parsing

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Normalization
// ============================================================================

#[test]
fn test_single_element_array_is_unwrapped() {
    let doc = normalize_explain_document(json!([
        { "Plan": { "Node Type": "Result", "Total Cost": 0.01 }, "Planning Time": 0.2 }
    ]));
    assert_eq!(
        doc,
        json!({ "Plan": { "Node Type": "Result", "Total Cost": 0.01 }, "Planning Time": 0.2 })
    );
}

#[test]
fn test_object_without_plan_is_wrapped() {
    let doc = normalize_explain_document(json!({ "Node Type": "Seq Scan" }));
    assert_eq!(doc, json!({ "Plan": { "Node Type": "Seq Scan" } }));
}

#[test]
fn test_other_shapes_become_empty_plan() {
    assert_eq!(normalize_explain_document(json!(42)), json!({ "Plan": {} }));
    assert_eq!(normalize_explain_document(json!([])), json!({ "Plan": {} }));
    assert_eq!(
        normalize_explain_document(json!([{ "Plan": {} }, { "Plan": {} }])),
        json!({ "Plan": {} })
    );
    assert_eq!(normalize_explain_document(json!(null)), json!({ "Plan": {} }));
}

#[test]
fn test_text_input_parses_to_same_document() {
    let text = r#" [{"Plan": {"Node Type": "Seq Scan", "Total Cost": 12.5}}] "#;
    let from_text = normalize_explain_text(text).unwrap();
    let from_value =
        normalize_explain_document(json!([{ "Plan": { "Node Type": "Seq Scan", "Total Cost": 12.5 } }]));
    assert_eq!(from_text, from_value);
}

#[test]
fn test_invalid_text_is_an_error() {
    let err = normalize_explain_text("Seq Scan on users").unwrap_err();
    assert!(matches!(err, PostgresExplainError::InvalidJson(_)));
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_simple_seq_scan() {
    let json = r#"[
        {
            "Plan": {
                "Node Type": "Seq Scan",
                "Relation Name": "users",
                "Alias": "u",
                "Startup Cost": 0.00,
                "Total Cost": 10.50,
                "Plan Rows": 100,
                "Plan Width": 36,
                "Filter": "(active = true)",
                "Parallel Aware": false
            }
        }
    ]"#;

    let plan = parse_postgres_explain(json).expect("parse failed");

    assert_eq!(plan.root.node_type, NodeType::SeqScan);
    assert_eq!(plan.root.raw_node_type.as_deref(), Some("Seq Scan"));
    assert_eq!(plan.root.relation.as_deref(), Some("users"));
    assert_eq!(plan.root.alias.as_deref(), Some("u"));
    assert_eq!(
        plan.root.cost,
        Some(NodeCost {
            startup: 0.0,
            total: 10.5
        })
    );
    assert_eq!(plan.root.rows, Some(100));
    assert_eq!(plan.root.width, Some(36));
    assert_eq!(plan.root.filter.as_deref(), Some("(active = true)"));
    assert_eq!(plan.root.extra.get("Parallel Aware"), Some(&json!(false)));
    assert_eq!(plan.total_cost(), 10.5);
}

#[test]
fn test_parse_nested_analyze_plan() {
    let doc = json!({
        "Plan": {
            "Node Type": "Sort",
            "Total Cost": 410.2,
            "Startup Cost": 400.0,
            "Sort Key": ["o.created_at DESC"],
            "Sort Method": "quicksort",
            "Actual Rows": 50,
            "Actual Loops": 1,
            "Plans": [{
                "Node Type": "Hash Join",
                "Join Type": "Inner",
                "Total Cost": 390.0,
                "Plans": [
                    { "Node Type": "Seq Scan", "Relation Name": "orders", "Rows Removed by Filter": 9000 },
                    { "Node Type": "Hash", "Plans": [
                        { "Node Type": "Index Scan", "Relation Name": "customers", "Index Name": "customers_pkey" }
                    ]}
                ]
            }]
        },
        "Planning Time": 0.31,
        "Execution Time": 12.7
    });

    let plan = plan_from_document(doc.clone());

    assert_eq!(plan.root.node_type, NodeType::Sort);
    assert_eq!(plan.root.sort_keys, vec!["o.created_at DESC".to_string()]);
    assert_eq!(plan.root.sort_method.as_deref(), Some("quicksort"));
    assert_eq!(plan.root.children[0].join_type, Some(JoinType::Inner));
    assert_eq!(plan.root.node_count(), 5);
    let indexes: Vec<&str> = plan.nodes().filter_map(|n| n.index_name.as_deref()).collect();
    assert_eq!(indexes, vec!["customers_pkey"]);
    assert_eq!(plan.planning_time_ms, Some(0.31));
    assert_eq!(plan.execution_time_ms, Some(12.7));
    assert_eq!(plan.document, doc);
}

#[test]
fn test_missing_node_type_is_unknown() {
    let plan = plan_from_document(json!({ "Plan": { "Total Cost": 3.0 } }));
    assert_eq!(plan.root.node_type, NodeType::Unknown);
    assert!(plan.root.raw_node_type.is_none());
    assert_eq!(plan.total_cost(), 3.0);
}

#[test]
fn test_empty_plan_has_zero_cost() {
    let plan = plan_from_document(normalize_explain_document(json!("nonsense")));
    assert_eq!(plan.root.node_type, NodeType::Unknown);
    assert_eq!(plan.total_cost(), 0.0);
}

#[test]
fn test_fractional_row_counts_are_rounded() {
    let plan = plan_from_document(json!({
        "Plan": { "Node Type": "Seq Scan", "Actual Rows": 33.4, "Plan Rows": 120 }
    }));
    assert_eq!(plan.root.actual_rows, Some(33));
    assert_eq!(plan.root.rows, Some(120));
}
