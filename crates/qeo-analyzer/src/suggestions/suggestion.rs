//! Suggestion model

use crate::suggestions::IndexTarget;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Rewrite,
    Index,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rewrite => "rewrite",
            Self::Index => "index",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    High,
    Medium,
    Low,
}

impl Impact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// A single optimization suggestion. `title` is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub kind: SuggestionKind,
    pub title: String,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
    /// 0.0 ..= 1.0
    pub confidence: f64,
    /// Suggested SQL, never executed
    #[serde(default)]
    pub statements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_reduction_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_index_width_bytes: Option<u64>,
    /// Structured target of an index suggestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_target: Option<IndexTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_cost_before: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_cost_after: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_cost_delta: Option<f64>,
    /// Number of workload queries that produced this suggestion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
}

impl Suggestion {
    pub fn new(kind: SuggestionKind, title: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            rationale: rationale.into(),
            impact: None,
            confidence: 0.0,
            statements: Vec::new(),
            alt_sql: None,
            safety_notes: None,
            score: None,
            reason: None,
            est_reduction_pct: None,
            est_index_width_bytes: None,
            index_target: None,
            est_cost_before: None,
            est_cost_after: None,
            est_cost_delta: None,
            frequency: None,
        }
    }

    pub fn rewrite(title: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(SuggestionKind::Rewrite, title, rationale)
    }

    pub fn index(title: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(SuggestionKind::Index, title, rationale)
    }

    pub fn with_impact(mut self, impact: Impact) -> Self {
        self.impact = Some(impact);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_statement(mut self, statement: impl Into<String>) -> Self {
        self.statements.push(statement.into());
        self
    }

    pub fn with_alt_sql(mut self, alt_sql: impl Into<String>) -> Self {
        self.alt_sql = Some(alt_sql.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_index_target(mut self, target: IndexTarget) -> Self {
        self.index_target = Some(target);
        self
    }

    pub fn is_index(&self) -> bool {
        self.kind == SuggestionKind::Index
    }
}
