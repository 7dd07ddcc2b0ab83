//! QEO Services Layer
//!
//! Orchestrates the advisory pipeline over a live [`qeo_core::Connection`].
//!
//! # Architecture
//!
//! ```text
//! Host (qeo-cli)
//!     ↓
//! Service Layer (qeo-services) ← This crate
//!     ↓
//! Analysis (qeo-analyzer)
//!     ↓
//! Infrastructure (qeo-core, qeo-driver-postgres)
//! ```
//!
//! # Services
//!
//! - [`QueryAdvisor`] - single-query pipeline from static analysis to ranking
//! - [`WhatIfEvaluator`] - measures index candidates with hypothetical indexes
//! - [`WorkloadAggregator`] - merges index suggestions across a batch
//! - [`explain_client`] and [`catalog`] - the round trips the services build on
//!
//! Services never issue DDL. Every call reads the shared settings once and
//! keeps no state between calls.

mod advisor_service;
pub mod catalog;
mod error;
pub mod explain_client;
mod metrics;
mod whatif;
mod workload;

pub use advisor_service::{
    DEFAULT_SCHEMA, DataSources, OptimizeReport, OptimizeRequest, PlanSource, QueryAdvisor,
};
pub use error::{ServiceError, ServiceResult};
pub use explain_client::{ExplainOutput, run_explain, run_explain_costs, total_cost};
pub use metrics::{AdvisorMetrics, NoopMetrics, TracingMetrics};
pub use whatif::{
    ExtensionStatus, Ranking, SkipReason, TrialOutcome, TrialRecord, WhatIfEvaluator,
    WhatIfResult, WhatIfStatus, check_extension,
};
pub use workload::{PerQuery, WorkloadAggregator, WorkloadResult, merge_index_suggestions};
