pub mod backtester;
pub mod scorer;
pub mod vm;

pub use backtester::{BacktestEvaluator, BacktestResult};
pub use scorer::{Assessment, ProgramScorer};
pub use vm::{DegeneracyConfig, DegenerateReason, FactorVm, VmOutcome};
