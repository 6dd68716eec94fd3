use super::traits::ConfigSection;
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Adds the SENTIMENT and NEWS_COUNT leaves to the vocabulary.
    pub enable_sentiment: bool,
}

impl ConfigSection for FeatureConfig {
    fn section_name() -> &'static str {
        "features"
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
