//! Planner configuration loading.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Search budgets and rule-selection weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Max number of concrete rule nodes created in one session (rebinds included).
    /// Running out is an ordinary planning failure.
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Max number of rule layers between the goal and the frontier. A node at
    /// this depth cannot be extended further.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Cap on alternative binding sets enumerated for one rule node.
    #[serde(default = "default_max_binding_candidates")]
    pub max_binding_candidates: usize,

    #[serde(default)]
    pub scoring: ScoringWeights,
}

/// Weights of the rule selection score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub trial_weight: f64,
    pub probability_weight: f64,
    pub cost_weight: f64,
    pub recursion_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            trial_weight: 0.30,
            probability_weight: 0.35,
            cost_weight: 0.35,
            recursion_bonus: 0.50,
        }
    }
}

fn default_max_expansions() -> usize {
    4096
}
fn default_max_depth() -> usize {
    64
}
fn default_max_binding_candidates() -> usize {
    256
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_expansions: default_max_expansions(),
            max_depth: default_max_depth(),
            max_binding_candidates: default_max_binding_candidates(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read planner config from {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse planner config from {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }
}
