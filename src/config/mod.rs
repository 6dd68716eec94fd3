pub mod features;
pub mod manager;
pub mod model;
pub mod reward;
pub mod traits;
pub mod training;

pub use features::FeatureConfig;
pub use manager::{AppConfig, ConfigManager};
pub use model::ModelConfig;
pub use reward::RewardConfig;
pub use traits::ConfigSection;
pub use training::TrainingConfig;
