//! Query EXPLAIN module
//!
//! Plan model and the PostgreSQL `EXPLAIN (FORMAT JSON)` parser.
//!
//! # Example
//!
//! ```
//! use qeo_analyzer::explain::{parse_postgres_explain, NodeType};
//!
//! let pg_json = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users"}}]"#;
//! let plan = parse_postgres_explain(pg_json).unwrap();
//! assert_eq!(plan.root.node_type, NodeType::SeqScan);
//! ```

pub mod plan;
pub mod postgres;

pub use plan::{JoinType, NodeCost, NodeType, PlanNode, PlanNodes, QueryPlan};
pub use postgres::{
    PostgresExplainError, normalize_explain_document, normalize_explain_text,
    parse_postgres_explain, plan_from_document,
};
