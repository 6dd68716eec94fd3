use crate::config::RewardConfig;
use crate::engines::metrics::{panel_ic, RiskMetrics, RATIO_CAP};
use crate::error::{AlphaMinerError, Result};
use crate::functions::primitives::cs_zscore;
use crate::types::Metrics;
use ndarray::{Array2, Axis, Zip};

/// Daily long/short simulation of one factor.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub metrics: Metrics,
    /// Net strategy return per evaluated period.
    pub returns: Vec<f64>,
    pub equity_curve: Vec<f64>,
}

/// Cross-sectional backtest: positions follow the sign of the per-period
/// z-score once it clears the signal threshold.
pub struct BacktestEvaluator {
    config: RewardConfig,
}

impl BacktestEvaluator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Positions in `{-1, 0, 1}`; cells without a usable score are flat.
    pub fn positions(&self, factor: &Array2<f64>) -> Array2<f64> {
        let threshold = self.config.signal_threshold;
        cs_zscore(factor).mapv(|z| {
            if z.is_finite() && z.abs() > threshold {
                z.signum()
            } else {
                0.0
            }
        })
    }

    pub fn run(&self, factor: &Array2<f64>, forward: &Array2<f64>) -> Result<BacktestResult> {
        if factor.dim() != forward.dim() {
            return Err(AlphaMinerError::ShapeMismatch {
                name: "factor".to_string(),
                expected: forward.dim(),
                actual: factor.dim(),
            });
        }

        let positions = self.positions(factor);
        let (_, instruments) = positions.dim();
        let mut previous = vec![0.0; instruments];
        let mut returns = Vec::new();
        let mut turnovers = Vec::new();

        for (pos_row, fwd_row) in positions.axis_iter(Axis(0)).zip(forward.axis_iter(Axis(0))) {
            let turnover = pos_row
                .iter()
                .zip(&previous)
                .map(|(p, q)| (p - q).abs())
                .sum::<f64>()
                / instruments.max(1) as f64;
            previous = pos_row.to_vec();

            let mut gross = 0.0;
            let mut valid = 0usize;
            Zip::from(&pos_row).and(&fwd_row).for_each(|&p, &r| {
                if r.is_finite() {
                    gross += p * r;
                    valid += 1;
                }
            });
            if valid == 0 {
                continue;
            }

            returns.push(gross / valid as f64 - self.config.cost_rate * turnover);
            turnovers.push(turnover);
        }

        let equity_curve = RiskMetrics::equity_curve(&returns);
        let metrics = Metrics {
            sortino: RiskMetrics::sortino(&returns),
            sharpe: RiskMetrics::sharpe(&returns),
            ic: panel_ic(factor, forward, false),
            rank_ic: panel_ic(factor, forward, true),
            max_drawdown: RiskMetrics::max_drawdown(&equity_curve),
            turnover: RiskMetrics::mean(&turnovers),
            mean_return: RiskMetrics::mean(&returns),
        };

        Ok(BacktestResult {
            metrics,
            returns,
            equity_curve,
        })
    }

    pub fn evaluate(&self, factor: &Array2<f64>, forward: &Array2<f64>) -> Result<Metrics> {
        Ok(self.run(factor, forward)?.metrics)
    }

    /// Configured primary metric clamped to `[-1, RATIO_CAP]`; `None` when
    /// it is not finite.
    pub fn score(&self, metrics: &Metrics) -> Option<f64> {
        let value = metrics.get(self.config.primary_metric);
        if value.is_finite() {
            Some(value.clamp(-1.0, RATIO_CAP))
        } else {
            None
        }
    }

    pub fn invalid_penalty(&self) -> f64 {
        self.config.invalid_formula_reward
    }

    pub fn degenerate_penalty(&self) -> f64 {
        self.config.constant_factor_reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimaryMetric;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn evaluator(cost_rate: f64) -> BacktestEvaluator {
        BacktestEvaluator::new(RewardConfig {
            cost_rate,
            ..RewardConfig::default()
        })
    }

    #[test]
    fn test_positions_follow_zscore_sign() {
        let pos = evaluator(0.0).positions(&array![[1.0, 2.0, 3.0], [5.0, 5.0, f64::NAN]]);
        assert_eq!(pos.row(0).to_vec(), vec![-1.0, 0.0, 1.0]);
        assert_eq!(pos.row(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_turnover_cost_is_charged() {
        let factor = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let forward = array![[-0.01, 0.0, 0.01], [-0.01, 0.0, 0.01]];

        let free = evaluator(0.0).run(&factor, &forward).unwrap();
        assert_relative_eq!(free.returns[0], 0.02 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(free.returns[1], 0.02 / 3.0, epsilon = 1e-12);

        let costly = evaluator(0.01).run(&factor, &forward).unwrap();
        // opening two legs out of three instruments
        assert_relative_eq!(costly.returns[0], 0.02 / 3.0 - 0.01 * 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(costly.returns[1], 0.02 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(costly.metrics.turnover, 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_periods_without_forward_returns_are_skipped() {
        let factor = array![[1.0, 2.0], [2.0, 1.0]];
        let forward = array![[0.01, 0.02], [f64::NAN, f64::NAN]];
        let result = evaluator(0.0).run(&factor, &forward).unwrap();
        assert_eq!(result.returns.len(), 1);
    }

    #[test]
    fn test_perfect_predictor_scores_at_cap() {
        let factor = array![[1.0, 2.0, 3.0], [3.0, 2.0, 1.0], [1.0, 3.0, 2.0]];
        let forward = factor.mapv(|v| v * 0.01);
        let eval = evaluator(0.0);
        let metrics = eval.evaluate(&factor, &forward).unwrap();
        assert_relative_eq!(metrics.ic, 1.0, epsilon = 1e-12);
        assert_relative_eq!(metrics.rank_ic, 1.0, epsilon = 1e-12);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(eval.score(&metrics), Some(RATIO_CAP));
    }

    #[test]
    fn test_score_uses_primary_metric() {
        let eval = BacktestEvaluator::new(RewardConfig {
            primary_metric: PrimaryMetric::Ic,
            ..RewardConfig::default()
        });
        let metrics = Metrics {
            ic: 0.05,
            sortino: 3.0,
            ..Metrics::default()
        };
        assert_eq!(eval.score(&metrics), Some(0.05));
        let broken = Metrics {
            ic: f64::NAN,
            ..Metrics::default()
        };
        assert_eq!(eval.score(&broken), None);
    }

    #[test]
    fn test_shape_mismatch() {
        let err = evaluator(0.0)
            .run(&Array2::zeros((2, 2)), &Array2::zeros((3, 2)))
            .unwrap_err();
        assert!(matches!(err, AlphaMinerError::ShapeMismatch { .. }));
    }
}
