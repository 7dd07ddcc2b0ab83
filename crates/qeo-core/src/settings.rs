//! Advisor settings
//!
//! Settings are read from an optional TOML file and then overridden by
//! `QEO_*` environment variables. Hosts wrap the loaded value in a
//! [`SharedSettings`] handle and services read a snapshot once per call.

use crate::{QeoError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Process-wide settings handle shared between the host and services
pub type SharedSettings = Arc<RwLock<AdvisorSettings>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub database_url: String,
    pub optimizer: OptimizerSettings,
    pub what_if: WhatIfSettings,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/postgres".to_string(),
            optimizer: OptimizerSettings::default(),
            what_if: WhatIfSettings::default(),
        }
    }
}

/// Heuristic advisor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Statement timeout applied before each planner round trip
    pub timeout_ms_default: u64,
    /// Tables with fewer estimated rows never get index suggestions
    pub min_rows_for_index: u64,
    pub max_index_cols: usize,
    /// Upper bound on suggestions returned per query
    pub top_k: usize,
    pub join_col_prior_boost: f64,
    pub index_max_width_bytes: u64,
    /// Index suggestions with a lower estimated gain are suppressed
    pub suppress_low_gain_pct: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            timeout_ms_default: 10_000,
            min_rows_for_index: 10_000,
            max_index_cols: 3,
            top_k: 10,
            join_col_prior_boost: 1.2,
            index_max_width_bytes: 8192,
            suppress_low_gain_pct: 5.0,
        }
    }
}

/// Hypothetical index evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatIfSettings {
    pub enabled: bool,
    pub max_trials: usize,
    pub min_cost_reduction_pct: f64,
}

impl Default for WhatIfSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_trials: 8,
            min_cost_reduction_pct: 5.0,
        }
    }
}

impl AdvisorSettings {
    /// Load settings from an optional TOML file, then apply `QEO_*` overrides
    /// from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|err| {
            QeoError::Configuration(format!("{}: {}", path.display(), err))
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| QeoError::Configuration(err.to_string()))
    }

    /// Apply overrides from a key lookup. The lookup receives the full
    /// variable name (e.g. `QEO_WHATIF_ENABLED`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("QEO_DB_URL") {
            self.database_url = url;
        }

        let opt = &mut self.optimizer;
        override_value(&lookup, "QEO_OPT_TIMEOUT_MS_DEFAULT", &mut opt.timeout_ms_default)?;
        override_value(&lookup, "QEO_OPT_MIN_ROWS_FOR_INDEX", &mut opt.min_rows_for_index)?;
        override_value(&lookup, "QEO_OPT_MAX_INDEX_COLS", &mut opt.max_index_cols)?;
        override_value(&lookup, "QEO_OPT_TOP_K", &mut opt.top_k)?;
        override_value(
            &lookup,
            "QEO_OPT_JOIN_COL_PRIOR_BOOST",
            &mut opt.join_col_prior_boost,
        )?;
        override_value(
            &lookup,
            "QEO_OPT_INDEX_MAX_WIDTH_BYTES",
            &mut opt.index_max_width_bytes,
        )?;
        override_value(
            &lookup,
            "QEO_OPT_SUPPRESS_LOW_GAIN_PCT",
            &mut opt.suppress_low_gain_pct,
        )?;

        let what_if = &mut self.what_if;
        if let Some(raw) = lookup("QEO_WHATIF_ENABLED") {
            what_if.enabled = parse_flag("QEO_WHATIF_ENABLED", &raw)?;
        }
        override_value(&lookup, "QEO_WHATIF_MAX_TRIALS", &mut what_if.max_trials)?;
        override_value(
            &lookup,
            "QEO_WHATIF_MIN_COST_REDUCTION_PCT",
            &mut what_if.min_cost_reduction_pct,
        )?;

        Ok(())
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }
}

fn override_value<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse::<T>().map_err(|_| {
            QeoError::Configuration(format!("invalid value for {}: {:?}", key, raw))
        })?;
    }
    Ok(())
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(QeoError::Configuration(format!(
            "invalid value for {}: {:?}",
            key, raw
        ))),
    }
}
