pub mod correlation;
pub mod risk;

pub use correlation::{panel_ic, pearson, spearman};
pub use risk::{RiskMetrics, RATIO_CAP};
