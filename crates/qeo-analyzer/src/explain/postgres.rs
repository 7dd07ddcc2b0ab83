//! PostgreSQL EXPLAIN (FORMAT JSON) normalization and parsing
//!
//! Drivers hand back the EXPLAIN result either as native JSON or as JSON
//! text, usually wrapped in a single-element array. Everything is first
//! normalized to one document shape, `{"Plan": {...}, ...}`, and the typed
//! tree is built from that document.
//!
//! # Examples
//!
//! ```
//! use qeo_analyzer::explain::NodeType;
//! use qeo_analyzer::explain::postgres::parse_postgres_explain;
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Startup Cost": 0.0,
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100,
//!       "Plan Width": 36
//!     }
//!   }
//! ]"#;
//!
//! let plan = parse_postgres_explain(json_output).unwrap();
//! assert_eq!(plan.count_of(NodeType::SeqScan), 1);
//! assert_eq!(plan.total_cost(), 10.0);
//! ```

use crate::explain::plan::{JoinType, NodeCost, NodeType, PlanNode, QueryPlan};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostgresExplainError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PostgresExplainError>;

const KNOWN_KEYS: &[&str] = &[
    "Node Type",
    "Relation Name",
    "Schema",
    "Alias",
    "Startup Cost",
    "Total Cost",
    "Plan Rows",
    "Plan Width",
    "Actual Rows",
    "Actual Total Time",
    "Actual Loops",
    "Filter",
    "Rows Removed by Filter",
    "Index Name",
    "Index Cond",
    "Join Type",
    "Sort Key",
    "Sort Method",
    "Plans",
];

/// Brings any EXPLAIN payload into `{"Plan": {...}}` form.
///
/// A single-element top-level array is unwrapped. An object that already
/// carries `Plan` is kept, any other object is wrapped as `{"Plan": obj}`,
/// and every other shape becomes `{"Plan": {}}`.
pub fn normalize_explain_document(value: Value) -> Value {
    let value = match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    };

    match value {
        Value::Object(obj) if obj.contains_key("Plan") => Value::Object(obj),
        Value::Object(obj) => {
            let mut wrapper = Map::new();
            wrapper.insert("Plan".to_string(), Value::Object(obj));
            Value::Object(wrapper)
        }
        _ => serde_json::json!({ "Plan": {} }),
    }
}

/// Parses JSON text then normalizes it
pub fn normalize_explain_text(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text.trim())?;
    Ok(normalize_explain_document(value))
}

/// Parses EXPLAIN (FORMAT JSON) text into a plan
pub fn parse_postgres_explain(text: &str) -> Result<QueryPlan> {
    Ok(plan_from_document(normalize_explain_text(text)?))
}

/// Builds the typed tree from an already normalized document.
///
/// Lenient by construction: a node without a `Node Type` becomes
/// [`NodeType::Unknown`] and missing numbers stay `None`.
pub fn plan_from_document(document: Value) -> QueryPlan {
    let root = document
        .get("Plan")
        .map(parse_plan_node)
        .unwrap_or_default();
    QueryPlan::new(root, document)
}

fn parse_plan_node(value: &Value) -> PlanNode {
    let raw_type = str_field(value, "Node Type");
    let node_type = raw_type
        .as_deref()
        .map(NodeType::from)
        .unwrap_or_default();

    let mut node = PlanNode::of(node_type);
    node.raw_node_type = raw_type;
    node.relation = str_field(value, "Relation Name");
    node.schema = str_field(value, "Schema");
    node.alias = str_field(value, "Alias");

    let startup = value.get("Startup Cost").and_then(Value::as_f64);
    let total = value.get("Total Cost").and_then(Value::as_f64);
    if let Some(total) = total {
        node.cost = Some(NodeCost {
            startup: startup.unwrap_or(0.0),
            total,
        });
    }

    node.rows = count_field(value, "Plan Rows");
    node.width = count_field(value, "Plan Width").map(|w| w as u32);
    node.actual_rows = count_field(value, "Actual Rows");
    node.actual_total_ms = value.get("Actual Total Time").and_then(Value::as_f64);
    node.loops = count_field(value, "Actual Loops");

    node.filter = str_field(value, "Filter");
    node.rows_removed_by_filter = count_field(value, "Rows Removed by Filter");
    node.index_name = str_field(value, "Index Name");
    node.index_cond = str_field(value, "Index Cond");
    node.join_type = str_field(value, "Join Type").and_then(|s| JoinType::parse(&s));

    if let Some(keys) = value.get("Sort Key").and_then(Value::as_array) {
        node.sort_keys = keys
            .iter()
            .filter_map(|k| k.as_str().map(String::from))
            .collect();
    }
    node.sort_method = str_field(value, "Sort Method");

    if let Some(plans) = value.get("Plans").and_then(Value::as_array) {
        node.children = plans.iter().map(parse_plan_node).collect();
    }

    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                node.extra.insert(key.clone(), val.clone());
            }
        }
    }

    node
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

// Row counts are integral in practice, but parallel plans can report
// fractional averages.
fn count_field(value: &Value, key: &str) -> Option<u64> {
    let v = value.get(key)?;
    v.as_u64()
        .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
}

#[cfg(test)]
mod tests;
