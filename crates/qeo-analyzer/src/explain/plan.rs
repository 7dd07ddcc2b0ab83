//! Typed EXPLAIN plan tree
//!
//! Built from a normalized PostgreSQL `EXPLAIN (FORMAT JSON)` document,
//! `{"Plan": {...}, ...}`. The document travels with the tree and is handed
//! back to callers untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPlan {
    pub root: PlanNode,
    /// `Planning Time`, reported by EXPLAIN ANALYZE
    pub planning_time_ms: Option<f64>,
    /// `Execution Time`, reported by EXPLAIN ANALYZE
    pub execution_time_ms: Option<f64>,
    pub document: Value,
}

impl QueryPlan {
    /// Pairs a parsed tree with its document; timings are read from the document
    pub fn new(root: PlanNode, document: Value) -> Self {
        let planning_time_ms = document.get("Planning Time").and_then(Value::as_f64);
        let execution_time_ms = document.get("Execution Time").and_then(Value::as_f64);
        Self {
            root,
            planning_time_ms,
            execution_time_ms,
            document,
        }
    }

    /// Root `Total Cost`, `0.0` when the planner reported none
    pub fn total_cost(&self) -> f64 {
        self.root.cost.map_or(0.0, |c| c.total)
    }

    /// Every node in planner order, parents before children
    pub fn nodes(&self) -> PlanNodes<'_> {
        PlanNodes {
            stack: vec![&self.root],
        }
    }

    pub fn count_of(&self, node_type: NodeType) -> usize {
        self.nodes().filter(|n| n.node_type == node_type).count()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanNode {
    pub node_type: NodeType,
    /// `Node Type` as printed by the planner
    pub raw_node_type: Option<String>,
    pub relation: Option<String>,
    pub schema: Option<String>,
    pub alias: Option<String>,
    pub cost: Option<NodeCost>,
    /// `Plan Rows`
    pub rows: Option<u64>,
    /// `Plan Width`, bytes
    pub width: Option<u32>,
    pub actual_rows: Option<u64>,
    pub actual_total_ms: Option<f64>,
    pub loops: Option<u64>,
    pub filter: Option<String>,
    pub rows_removed_by_filter: Option<u64>,
    pub index_name: Option<String>,
    pub index_cond: Option<String>,
    pub join_type: Option<JoinType>,
    pub sort_keys: Vec<String>,
    pub sort_method: Option<String>,
    pub children: Vec<PlanNode>,
    /// Keys without a dedicated field
    pub extra: HashMap<String, Value>,
}

impl PlanNode {
    pub fn of(node_type: NodeType) -> Self {
        Self {
            node_type,
            ..Self::default()
        }
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }

    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(PlanNode::depth).max().unwrap_or(0)
    }

    /// Actual rows when analyzed, estimated otherwise, times loops
    pub fn effective_rows(&self) -> Option<u64> {
        let rows = self.actual_rows.or(self.rows)?;
        Some(rows.saturating_mul(self.loops.unwrap_or(1).max(1)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NodeCost {
    pub startup: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
}

impl JoinType {
    pub fn parse(s: &str) -> Option<Self> {
        let join = match s.to_ascii_lowercase().as_str() {
            "inner" => Self::Inner,
            "left" => Self::Left,
            "right" => Self::Right,
            "full" => Self::Full,
            "semi" => Self::Semi,
            "anti" => Self::Anti,
            _ => return None,
        };
        Some(join)
    }
}

/// Plan operations the advisor tells apart. Everything else is `Unknown`
/// and still carries its printed name in [`PlanNode::raw_node_type`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    SeqScan,
    IndexScan,
    IndexOnlyScan,
    BitmapIndexScan,
    BitmapHeapScan,
    NestedLoop,
    HashJoin,
    MergeJoin,
    Hash,
    Sort,
    IncrementalSort,
    Aggregate,
    Append,
    Limit,
    #[default]
    Unknown,
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        match name {
            "Seq Scan" => Self::SeqScan,
            "Index Scan" => Self::IndexScan,
            "Index Only Scan" => Self::IndexOnlyScan,
            "Bitmap Index Scan" => Self::BitmapIndexScan,
            "Bitmap Heap Scan" => Self::BitmapHeapScan,
            "Nested Loop" => Self::NestedLoop,
            "Hash Join" => Self::HashJoin,
            "Merge Join" => Self::MergeJoin,
            "Hash" => Self::Hash,
            "Sort" => Self::Sort,
            "Incremental Sort" => Self::IncrementalSort,
            "Aggregate" | "GroupAggregate" | "HashAggregate" => Self::Aggregate,
            "Append" | "Merge Append" => Self::Append,
            "Limit" => Self::Limit,
            _ => Self::Unknown,
        }
    }
}

pub struct PlanNodes<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> Iterator for PlanNodes<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
