//! Optimization suggestions
//!
//! Heuristic rewrite and index advice derived from a statement's structure
//! and table statistics, plus the ordering rules used to rank suggestions.

mod advisor;
mod index_target;
pub mod ranking;
mod suggestion;

pub use advisor::*;
pub use index_target::*;
pub use suggestion::*;
