use super::backtester::BacktestEvaluator;
use super::vm::{DegenerateReason, FactorVm, VmOutcome};
use crate::data::features::FeatureSet;
use crate::engines::generation::generator::Draw;
use crate::engines::generation::program::Program;
use crate::engines::generation::validator::InvalidReason;
use crate::error::Result;
use crate::types::Metrics;
use ndarray::Array2;
use serde::Serialize;
use std::sync::Arc;

/// Reward-bearing verdict on one program.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Assessment {
    Scored { metrics: Metrics, reward: f64 },
    Invalid { reason: InvalidReason, reward: f64 },
    Degenerate { reason: DegenerateReason, reward: f64 },
}

impl Assessment {
    pub fn reward(&self) -> f64 {
        match self {
            Self::Scored { reward, .. }
            | Self::Invalid { reward, .. }
            | Self::Degenerate { reward, .. } => *reward,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Self::Scored { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    /// True when the reward is a configured penalty rather than a metric.
    pub fn is_penalized(&self) -> bool {
        !matches!(self, Self::Scored { .. })
    }
}

/// VM + evaluator bound to one feature set. Shared read-only across worker
/// threads.
pub struct ProgramScorer {
    vm: FactorVm,
    evaluator: BacktestEvaluator,
    features: Arc<FeatureSet>,
    forward_returns: Arc<Array2<f64>>,
}

impl ProgramScorer {
    pub fn new(
        vm: FactorVm,
        evaluator: BacktestEvaluator,
        features: Arc<FeatureSet>,
    ) -> Result<Self> {
        let forward_returns = features.forward_returns()?;
        Ok(Self {
            vm,
            evaluator,
            features,
            forward_returns,
        })
    }

    pub fn vm(&self) -> &FactorVm {
        &self.vm
    }

    pub fn evaluator(&self) -> &BacktestEvaluator {
        &self.evaluator
    }

    pub fn features(&self) -> &Arc<FeatureSet> {
        &self.features
    }

    pub fn invalid(&self, reason: InvalidReason) -> Assessment {
        Assessment::Invalid {
            reason,
            reward: self.evaluator.invalid_penalty(),
        }
    }

    /// Execute and backtest a well-formed program. Only configuration-level
    /// problems (missing feature, VM invariant) surface as errors.
    pub fn assess(&self, program: &Program) -> Result<Assessment> {
        let factor = match self.vm.execute(program, &self.features)? {
            VmOutcome::Factor(factor) => factor,
            VmOutcome::Degenerate(reason) => {
                return Ok(Assessment::Degenerate {
                    reason,
                    reward: self.evaluator.degenerate_penalty(),
                })
            }
        };

        let metrics = self.evaluator.evaluate(&factor, &self.forward_returns)?;
        Ok(match self.evaluator.score(&metrics) {
            Some(reward) => Assessment::Scored { metrics, reward },
            None => Assessment::Degenerate {
                reason: DegenerateReason::NonFinite,
                reward: self.evaluator.degenerate_penalty(),
            },
        })
    }

    pub fn assess_draw(&self, draw: &Draw) -> Result<Assessment> {
        match draw {
            Draw::Valid { program, .. } => self.assess(program),
            Draw::Rejected(reason) => Ok(self.invalid(reason.clone())),
        }
    }
}
