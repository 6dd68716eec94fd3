use super::traits::ConfigSection;
use crate::error::{AlphaMinerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: usize,
    pub learning_rate: f64,
    pub num_steps: usize,
    pub entropy_coef: f64,
    /// Weight of the previous baseline in the moving average.
    pub baseline_decay: f64,
    pub max_grad_norm: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub hall_of_fame_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 1e-3,
            num_steps: 100,
            entropy_coef: 0.01,
            baseline_decay: 0.9,
            max_grad_norm: 1.0,
            seed: None,
            hall_of_fame_size: 10,
        }
    }
}

impl ConfigSection for TrainingConfig {
    fn section_name() -> &'static str {
        "training"
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AlphaMinerError::Configuration(
                "Batch size must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(AlphaMinerError::Configuration(
                "Learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.baseline_decay) {
            return Err(AlphaMinerError::Configuration(
                "Baseline decay must be in [0, 1)".to_string(),
            ));
        }
        if self.entropy_coef < 0.0 {
            return Err(AlphaMinerError::Configuration(
                "Entropy coefficient must be non-negative".to_string(),
            ));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(AlphaMinerError::Configuration(
                "Max gradient norm must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
