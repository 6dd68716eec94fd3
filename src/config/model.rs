use super::traits::ConfigSection;
use crate::engines::generation::MAX_FORMULA_NAMES;
use crate::error::{AlphaMinerError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub d_model: usize,
    pub num_layers: usize,
    pub nhead: usize,
    pub max_seq_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            d_model: 64,
            num_layers: 2,
            nhead: 4,
            max_seq_len: 15,
        }
    }
}

impl ConfigSection for ModelConfig {
    fn section_name() -> &'static str {
        "model"
    }

    fn validate(&self) -> Result<()> {
        if self.nhead == 0 || self.d_model == 0 || self.d_model % self.nhead != 0 {
            return Err(AlphaMinerError::Configuration(format!(
                "d_model ({}) must be a positive multiple of nhead ({})",
                self.d_model, self.nhead
            )));
        }
        if self.max_seq_len == 0 {
            return Err(AlphaMinerError::Configuration(
                "max_seq_len must be at least 1".to_string(),
            ));
        }
        // canonical strings of longer programs could not be parsed back
        if self.max_seq_len > MAX_FORMULA_NAMES {
            return Err(AlphaMinerError::Configuration(format!(
                "max_seq_len ({}) exceeds the formula parser limit ({})",
                self.max_seq_len, MAX_FORMULA_NAMES
            )));
        }
        Ok(())
    }
}
