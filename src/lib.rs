//! Alpha-mining engine: a closed formula DSL, a stack VM over
//! `(time, instrument)` feature tensors, a cross-sectional backtest and a
//! grammar-masked policy network trained with REINFORCE.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod functions;
pub mod miner;
pub mod types;

pub use error::{AlphaMinerError, Result};
pub use miner::{AlphaMiner, EvaluationOutcome, FormulaInput, TrainOptions};
