//! Plan warnings
//!
//! Inspects a parsed plan for common performance smells (large sequential
//! scans, filtered scans without an index, expensive nested loops, large
//! sorts, filters that discard most rows) and extracts summary metrics.

use crate::explain::{NodeType, PlanNode, QueryPlan};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Critical,
    Warning,
    Info,
}

impl SeverityLevel {
    pub fn is_warning_or_above(&self) -> bool {
        matches!(self, Self::Critical | Self::Warning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    LargeSeqScan,
    MissingIndex,
    ExpensiveNestedLoop,
    LargeSort,
    InefficientFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanWarning {
    pub kind: WarningKind,
    pub severity: SeverityLevel,
    pub message: String,
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl PlanWarning {
    fn new(
        kind: WarningKind,
        severity: SeverityLevel,
        message: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            recommendation: recommendation.into(),
            table: None,
        }
    }

    fn with_table(mut self, table: Option<&str>) -> Self {
        self.table = table.map(String::from);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMetrics {
    pub node_count: usize,
    pub depth: usize,
    pub total_cost: f64,
    pub seq_scans: usize,
    pub planning_time_ms: Option<f64>,
    pub execution_time_ms: Option<f64>,
}

/// Thresholds for [`PlanInspector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorConfig {
    /// Sequential scans reading at least this many rows are reported
    pub large_table_rows: u64,
    /// Row volume above which a finding becomes critical
    pub high_row_threshold: u64,
    /// Fraction of rows removed by a filter that counts as inefficient
    pub filter_efficiency_threshold: f64,
    /// Sorts spilling past this many KB are reported
    pub sort_space_kb: u64,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            large_table_rows: 1_000,
            high_row_threshold: 10_000,
            filter_efficiency_threshold: 0.5,
            sort_space_kb: 1024,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanInspector {
    config: InspectorConfig,
}

impl PlanInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: InspectorConfig) -> Self {
        Self { config }
    }

    /// Warnings in plan order plus plan metrics
    pub fn inspect(&self, plan: &QueryPlan) -> (Vec<PlanWarning>, PlanMetrics) {
        let mut warnings = Vec::new();
        for node in plan.nodes() {
            match node.node_type {
                NodeType::SeqScan => self.check_seq_scan(node, &mut warnings),
                NodeType::NestedLoop => self.check_nested_loop(node, &mut warnings),
                NodeType::Sort | NodeType::IncrementalSort => {
                    self.check_sort(node, &mut warnings)
                }
                _ => {}
            }
            self.check_filter_efficiency(node, &mut warnings);
        }

        let metrics = PlanMetrics {
            node_count: plan.root.node_count(),
            depth: plan.root.depth(),
            total_cost: plan.total_cost(),
            seq_scans: plan.count_of(NodeType::SeqScan),
            planning_time_ms: plan.planning_time_ms,
            execution_time_ms: plan.execution_time_ms,
        };
        (warnings, metrics)
    }

    fn check_seq_scan(&self, node: &PlanNode, warnings: &mut Vec<PlanWarning>) {
        let rows = node.effective_rows().unwrap_or(0);
        if rows < self.config.large_table_rows {
            return;
        }
        let table = node.relation.as_deref().unwrap_or("unknown");

        let severity = if rows >= self.config.high_row_threshold {
            SeverityLevel::Critical
        } else {
            SeverityLevel::Warning
        };
        warnings.push(
            PlanWarning::new(
                WarningKind::LargeSeqScan,
                severity,
                format!("Sequential scan on '{}' reading {} rows", table, rows),
                format!(
                    "Consider adding an index on '{}' or filtering on indexed columns",
                    table
                ),
            )
            .with_table(node.relation.as_deref()),
        );

        if let Some(filter) = &node.filter {
            warnings.push(
                PlanWarning::new(
                    WarningKind::MissingIndex,
                    SeverityLevel::Warning,
                    format!("Sequential scan with filter on '{}': {}", table, filter),
                    "An index on the filtered columns may avoid the full scan",
                )
                .with_table(node.relation.as_deref()),
            );
        }
    }

    fn check_nested_loop(&self, node: &PlanNode, warnings: &mut Vec<PlanWarning>) {
        let rows = node.effective_rows().unwrap_or(0);
        if rows < self.config.high_row_threshold {
            return;
        }
        warnings.push(PlanWarning::new(
            WarningKind::ExpensiveNestedLoop,
            SeverityLevel::Warning,
            format!("Nested loop join producing {} rows", rows),
            "Consider adding indexes on join columns or restructuring the query",
        ));
    }

    fn check_sort(&self, node: &PlanNode, warnings: &mut Vec<PlanWarning>) {
        let rows = node.effective_rows().unwrap_or(0);
        let space_kb = node
            .extra
            .get("Sort Space Used")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if rows < self.config.high_row_threshold && space_kb <= self.config.sort_space_kb {
            return;
        }
        let message = if space_kb > 0 {
            format!("Sort on {} rows using {}KB", rows, space_kb)
        } else {
            format!("Sort on {} rows", rows)
        };
        warnings.push(PlanWarning::new(
            WarningKind::LargeSort,
            SeverityLevel::Info,
            message,
            "An index matching the sort keys, or more work_mem, can avoid the sort",
        ));
    }

    fn check_filter_efficiency(&self, node: &PlanNode, warnings: &mut Vec<PlanWarning>) {
        let (Some(removed), Some(kept)) = (node.rows_removed_by_filter, node.actual_rows) else {
            return;
        };
        let total = removed + kept;
        if total == 0 {
            return;
        }
        let ratio = removed as f64 / total as f64;
        if ratio < self.config.filter_efficiency_threshold {
            return;
        }
        let table = node.relation.as_deref().unwrap_or("unknown");
        warnings.push(
            PlanWarning::new(
                WarningKind::InefficientFilter,
                SeverityLevel::Info,
                format!(
                    "Filter removed {:.0}% of rows ({} of {})",
                    ratio * 100.0,
                    removed,
                    total
                ),
                format!(
                    "Consider adding an index on the filtered column(s) of '{}'",
                    table
                ),
            )
            .with_table(node.relation.as_deref()),
        );
    }
}
