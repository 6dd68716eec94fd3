// src/engines/metrics/risk.rs

/// Upper bound on reported ratios; also what Sortino reports when there is
/// no downside at all.
pub const RATIO_CAP: f64 = 10.0;

pub struct RiskMetrics;

impl RiskMetrics {
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        let mean = Self::mean(values);
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        variance.sqrt()
    }

    /// Mean over root-mean-square of the negative part, capped at
    /// `RATIO_CAP`. Never below -1: the mean is at least the mean of the
    /// negative part, whose magnitude the RMS bounds.
    pub fn sortino(returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }
        let avg_return = Self::mean(returns);
        let downside = (returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>()
            / returns.len() as f64)
            .sqrt();

        if downside > 0.0 {
            (avg_return / downside).min(RATIO_CAP)
        } else if avg_return > 0.0 {
            RATIO_CAP
        } else {
            0.0
        }
    }

    /// Per-period Sharpe ratio, risk-free rate zero.
    pub fn sharpe(returns: &[f64]) -> f64 {
        let volatility = Self::std_dev(returns);
        if volatility > 0.0 {
            (Self::mean(returns) / volatility).clamp(-RATIO_CAP, RATIO_CAP)
        } else {
            0.0
        }
    }

    /// Compound the returns into an equity curve starting at 1.
    pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
        let mut equity = Vec::with_capacity(returns.len() + 1);
        let mut value = 1.0;
        equity.push(value);
        for r in returns {
            value *= 1.0 + r;
            equity.push(value);
        }
        equity
    }

    /// Largest peak-to-trough loss as a fraction of the peak.
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        let mut max_dd = 0.0;
        let mut peak = match equity.first() {
            Some(&first) => first,
            None => return 0.0,
        };

        for &value in equity.iter() {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                let dd = (peak - value) / peak;
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_sortino_without_downside_hits_cap() {
        assert_eq!(RiskMetrics::sortino(&[0.01, 0.02, 0.0]), RATIO_CAP);
        assert_eq!(RiskMetrics::sortino(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_sortino_value() {
        // mean = 0.0025, downside rms = sqrt(0.0001 / 4) = 0.005
        let returns = [0.02, -0.01, 0.0, 0.0];
        assert_relative_eq!(RiskMetrics::sortino(&returns), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sortino_all_losses() {
        // mean = -0.015, downside rms = sqrt(0.00025)
        let expected = -0.015 / 0.00025f64.sqrt();
        assert_relative_eq!(RiskMetrics::sortino(&[-0.01, -0.02]), expected, epsilon = 1e-12);
        assert_relative_eq!(RiskMetrics::sortino(&[-0.01, -0.01, -0.01]), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sortino_never_below_minus_one() {
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..500 {
            let len = rng.gen_range(1..40);
            let drift = rng.gen_range(-0.05..0.05);
            let returns: Vec<f64> = (0..len).map(|_| drift + rng.gen_range(-0.03..0.03)).collect();
            let sortino = RiskMetrics::sortino(&returns);
            assert!(sortino >= -1.0 - 1e-12, "{} for {:?}", sortino, returns);
            assert!(sortino <= RATIO_CAP);
        }
    }

    #[test]
    fn test_max_drawdown_of_compounded_curve() {
        let equity = RiskMetrics::equity_curve(&[0.1, -0.5, 0.2]);
        assert_relative_eq!(equity[3], 1.1 * 0.5 * 1.2, epsilon = 1e-12);
        assert_relative_eq!(RiskMetrics::max_drawdown(&equity), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_sharpe_flat_series() {
        assert_eq!(RiskMetrics::sharpe(&[0.01, 0.01]), 0.0);
    }
}
