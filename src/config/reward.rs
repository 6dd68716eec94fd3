use super::traits::ConfigSection;
use crate::engines::evaluation::vm::DegeneracyConfig;
use crate::error::{AlphaMinerError, Result};
use crate::types::PrimaryMetric;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub invalid_formula_reward: f64,
    pub constant_factor_reward: f64,
    /// Charged per unit of position change.
    pub cost_rate: f64,
    /// Minimum |z-score| before a position is taken.
    pub signal_threshold: f64,
    pub primary_metric: PrimaryMetric,
    pub max_nan_ratio: f64,
    pub constant_ratio: f64,
    pub variance_epsilon: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            invalid_formula_reward: -5.0,
            constant_factor_reward: -2.0,
            cost_rate: 0.001,
            signal_threshold: 0.5,
            primary_metric: PrimaryMetric::Sortino,
            max_nan_ratio: 0.5,
            constant_ratio: 0.9,
            variance_epsilon: 1e-10,
        }
    }
}

impl RewardConfig {
    pub fn degeneracy(&self) -> DegeneracyConfig {
        DegeneracyConfig {
            max_nan_ratio: self.max_nan_ratio,
            constant_ratio: self.constant_ratio,
            variance_epsilon: self.variance_epsilon,
        }
    }
}

impl ConfigSection for RewardConfig {
    fn section_name() -> &'static str {
        "reward"
    }

    fn validate(&self) -> Result<()> {
        // penalties sit below every reachable metric reward
        if !(self.invalid_formula_reward <= self.constant_factor_reward
            && self.constant_factor_reward < -1.0)
        {
            return Err(AlphaMinerError::Configuration(format!(
                "Penalties must satisfy invalid ({}) <= constant ({}) < -1",
                self.invalid_formula_reward, self.constant_factor_reward
            )));
        }
        if self.cost_rate < 0.0 || self.signal_threshold < 0.0 {
            return Err(AlphaMinerError::Configuration(
                "Cost rate and signal threshold must be non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_nan_ratio) || !(0.0..=1.0).contains(&self.constant_ratio)
        {
            return Err(AlphaMinerError::Configuration(
                "Degeneracy ratios must be between 0 and 1".to_string(),
            ));
        }
        if self.variance_epsilon < 0.0 {
            return Err(AlphaMinerError::Configuration(
                "Variance epsilon must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
