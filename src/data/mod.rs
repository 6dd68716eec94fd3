pub mod connectors;
pub mod features;
pub mod synthetic;

pub use connectors::PanelCsvConnector;
pub use features::{FeatureSet, FeatureTensor};
pub use synthetic::SyntheticMarket;
