//! Human-readable and JSON output

use anyhow::Result;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use qeo_analyzer::{PlanNode, QueryPlan, Suggestion};
use qeo_services::{OptimizeReport, PerQuery, WorkloadResult};
use serde::Serialize;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn node_label(node: &PlanNode) -> String {
    node.raw_node_type
        .clone()
        .unwrap_or_else(|| format!("{:?}", node.node_type))
}

pub fn plan_table(plan: &QueryPlan) -> Table {
    let mut table = new_table(vec!["Node", "Relation", "Index", "Cost", "Rows"]);
    for node in plan.nodes() {
        table.add_row(vec![
            node_label(node),
            opt(node.relation.as_deref()),
            opt(node.index_name.as_deref()),
            opt(node.cost.map(|c| format!("{:.2}..{:.2}", c.startup, c.total))),
            opt(node.rows),
        ]);
    }
    table
}

fn suggestion_table(suggestions: &[Suggestion]) -> Table {
    let mut table = new_table(vec!["Kind", "Title", "Impact", "Score", "Cost Δ", "Statement"]);
    for s in suggestions {
        table.add_row(vec![
            s.kind.as_str().to_string(),
            s.title.clone(),
            opt(s.impact.map(|i| i.as_str())),
            opt(s.score.map(|v| format!("{:.3}", v))),
            opt(s.est_cost_delta.map(|v| format!("{:.3}", v))),
            s.statements.first().cloned().unwrap_or_default(),
        ]);
    }
    table
}

pub fn print_report(report: &OptimizeReport) {
    if !report.plan_warnings.is_empty() {
        let mut warnings = new_table(vec!["Severity", "Warning", "Recommendation"]);
        for w in &report.plan_warnings {
            warnings.add_row(vec![
                w.severity.as_str().to_string(),
                w.message.clone(),
                w.recommendation.clone(),
            ]);
        }
        println!("{}", warnings);
    }

    if report.suggestions.is_empty() {
        println!("No suggestions.");
    } else {
        println!("{}", suggestion_table(&report.suggestions));
    }

    println!(
        "{} (score {:.3}) | ranking: {:?} | what-if trials: {}, filtered: {}",
        report.summary.summary,
        report.summary.score,
        report.ranking,
        report.what_if.trials,
        report.what_if.filtered_by_pct
    );
}

pub fn print_workload(result: &WorkloadResult) {
    let mut merged = new_table(vec!["Title", "Queries", "Score", "Statement"]);
    for s in &result.suggestions {
        merged.add_row(vec![
            s.title.clone(),
            opt(s.frequency),
            opt(s.score.map(|v| format!("{:.3}", v))),
            s.statements.first().cloned().unwrap_or_default(),
        ]);
    }
    println!("{}", merged);

    let mut per_query = new_table(vec!["Statement", "Suggestions"]);
    for query in &result.per_query {
        let count = match query {
            PerQuery::Analyzed { suggestions, .. } => suggestions.len().to_string(),
            PerQuery::Skipped { .. } => "skipped".to_string(),
        };
        per_query.add_row(vec![query.sql().to_string(), count]);
    }
    println!("{}", per_query);
}
