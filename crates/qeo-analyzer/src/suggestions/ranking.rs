//! Deterministic ordering and rounding helpers

use crate::suggestions::{Impact, Suggestion};
use std::cmp::Ordering;

/// Rounds to three decimals
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// high 3, medium 2, low 1, unspecified 0
pub fn impact_rank(impact: Option<Impact>) -> u8 {
    match impact {
        Some(Impact::High) => 3,
        Some(Impact::Medium) => 2,
        Some(Impact::Low) => 1,
        None => 0,
    }
}

/// Cost-based order: cost delta descending (absent counts as 0), then
/// impact, then confidence, both descending, then title ascending.
pub fn compare_cost_based(a: &Suggestion, b: &Suggestion) -> Ordering {
    let delta_a = a.est_cost_delta.unwrap_or(0.0);
    let delta_b = b.est_cost_delta.unwrap_or(0.0);
    delta_b
        .total_cmp(&delta_a)
        .then_with(|| impact_rank(b.impact).cmp(&impact_rank(a.impact)))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| a.title.cmp(&b.title))
}

pub fn sort_cost_based(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(compare_cost_based);
}

/// Advisor order: rewrites first, then score descending, then title.
pub fn compare_heuristic(a: &Suggestion, b: &Suggestion) -> Ordering {
    let group = |s: &Suggestion| u8::from(s.is_index());
    group(a)
        .cmp(&group(b))
        .then_with(|| {
            b.score
                .unwrap_or(0.0)
                .total_cmp(&a.score.unwrap_or(0.0))
        })
        .then_with(|| a.title.cmp(&b.title))
}
