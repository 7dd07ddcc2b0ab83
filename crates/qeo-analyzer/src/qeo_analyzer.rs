//! QEO Analyzer - SQL structure analysis, EXPLAIN parsing and advice
//!
//! This crate provides functionality for:
//! - Parsing PostgreSQL EXPLAIN (FORMAT JSON) output into a plan tree
//! - Extracting filters, joins, ordering and grouping from SQL
//! - Heuristic rewrite and index suggestions with deterministic ranking
//! - Plan warnings and metrics

pub mod explain;
pub mod plan_warnings;
pub mod sql_info;
pub mod suggestions;

pub use explain::*;
pub use plan_warnings::*;
pub use sql_info::*;
pub use suggestions::*;
