//! Loop configuration.
//!
//! Passed explicitly into [`crate::orchestrator::ResearchLoop::new`]. Can be
//! read from a JSON document (durations in seconds) and overridden from
//! `MEDSIFT_*` environment variables:
//!
//! - `MEDSIFT_MAX_ITERATIONS`, `MEDSIFT_TOKEN_BUDGET`, `MEDSIFT_MAX_RESULTS`
//! - `MEDSIFT_PER_SOURCE_TIMEOUT_SECS`, `MEDSIFT_ITERATION_DEADLINE_SECS`,
//!   `MEDSIFT_JUDGE_TIMEOUT_SECS`, `MEDSIFT_WALL_CLOCK_SECS`
//! - `MEDSIFT_DEDUP_THRESHOLD`
//! - `MEDSIFT_ENABLED_SOURCES`, `MEDSIFT_SOURCE_PRIORITY` (comma separated)

use std::collections::BTreeSet;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::budget::BudgetLimits;
use crate::dedup::DEFAULT_THRESHOLD;

pub const MIN_ITERATIONS: u32 = 1;
pub const MAX_ITERATIONS: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_iterations must be between 1 and 50, got {0}")]
    MaxIterations(u32),

    #[error("dedup_threshold must be within 0.0..=1.0, got {0}")]
    Threshold(f64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("no sources enabled")]
    NoSources,

    #[error("{0}")]
    Registry(#[from] crate::source::RegistryError),

    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: String, value: String },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopConfig {
    pub max_iterations: u32,
    #[serde(with = "secs", rename = "per_source_timeout_secs")]
    pub per_source_timeout: Duration,
    #[serde(with = "secs", rename = "iteration_deadline_secs")]
    pub iteration_deadline: Duration,
    #[serde(with = "secs", rename = "judge_timeout_secs")]
    pub judge_timeout: Duration,
    #[serde(with = "secs", rename = "wall_clock_secs")]
    pub wall_clock_budget: Duration,
    pub dedup_threshold: f64,
    /// `None` enables every registered source.
    pub enabled_sources: Option<BTreeSet<String>>,
    /// Most trusted first. Empty means registration order.
    pub source_priority: Vec<String>,
    pub token_budget: u64,
    pub max_results_per_source: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            per_source_timeout: Duration::from_secs(30),
            iteration_deadline: Duration::from_secs(45),
            judge_timeout: Duration::from_secs(60),
            wall_clock_budget: Duration::from_secs(600),
            dedup_threshold: DEFAULT_THRESHOLD,
            enabled_sources: None,
            source_priority: Vec::new(),
            token_budget: 100_000,
            max_results_per_source: 10,
        }
    }
}

impl LoopConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `MEDSIFT_*` variables present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup` (keys are the `MEDSIFT_*` names).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MEDSIFT_MAX_ITERATIONS") {
            self.max_iterations = parse("MEDSIFT_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = get("MEDSIFT_TOKEN_BUDGET") {
            self.token_budget = parse("MEDSIFT_TOKEN_BUDGET", &v)?;
        }
        if let Some(v) = get("MEDSIFT_MAX_RESULTS") {
            self.max_results_per_source = parse("MEDSIFT_MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("MEDSIFT_DEDUP_THRESHOLD") {
            self.dedup_threshold = parse("MEDSIFT_DEDUP_THRESHOLD", &v)?;
        }
        for (key, field) in [
            ("MEDSIFT_PER_SOURCE_TIMEOUT_SECS", &mut self.per_source_timeout),
            ("MEDSIFT_ITERATION_DEADLINE_SECS", &mut self.iteration_deadline),
            ("MEDSIFT_JUDGE_TIMEOUT_SECS", &mut self.judge_timeout),
            ("MEDSIFT_WALL_CLOCK_SECS", &mut self.wall_clock_budget),
        ] {
            if let Some(v) = get(key) {
                let secs: f64 = parse(key, &v)?;
                *field = Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidEnv {
                    key: key.to_string(),
                    value: v.clone(),
                })?;
            }
        }
        if let Some(v) = get("MEDSIFT_ENABLED_SOURCES") {
            self.enabled_sources = Some(split_list(&v).collect());
        }
        if let Some(v) = get("MEDSIFT_SOURCE_PRIORITY") {
            self.source_priority = split_list(&v).collect();
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(ConfigError::MaxIterations(self.max_iterations));
        }
        if !self.dedup_threshold.is_finite() || !(0.0..=1.0).contains(&self.dedup_threshold) {
            return Err(ConfigError::Threshold(self.dedup_threshold));
        }
        for (name, value) in [
            ("per_source_timeout", self.per_source_timeout),
            ("iteration_deadline", self.iteration_deadline),
            ("judge_timeout", self.judge_timeout),
            ("wall_clock_budget", self.wall_clock_budget),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.token_budget == 0 {
            return Err(ConfigError::Zero("token_budget"));
        }
        if self.max_results_per_source == 0 {
            return Err(ConfigError::Zero("max_results_per_source"));
        }
        if self.enabled_sources.as_ref().is_some_and(|s| s.is_empty()) {
            return Err(ConfigError::NoSources);
        }
        Ok(())
    }

    pub fn budget_limits(&self) -> BudgetLimits {
        BudgetLimits {
            max_iterations: self.max_iterations,
            wall_clock: self.wall_clock_budget,
            tokens: self.token_budget,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
