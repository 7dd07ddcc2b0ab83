//! QEO Core - Core abstractions shared by the query advisor crates
//!
//! This crate provides the fundamental traits and types that all other
//! QEO crates depend on. It defines:
//!
//! - `Connection` - Trait for a single database session
//! - `AdvisorSettings` - Optimizer and what-if configuration
//! - Catalog snapshot types (`SchemaSnapshot`, `TableStats`)
//! - Common types like `Value`, `Row`, `QueryResult`

mod connection;
mod error;
mod schema;
pub mod settings;
mod types;

pub use connection::*;
pub use error::*;
pub use schema::*;
pub use settings::{AdvisorSettings, OptimizerSettings, SharedSettings, WhatIfSettings};
pub use types::*;
