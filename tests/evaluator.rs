use alphaminer::config::{AppConfig, FeatureConfig, RewardConfig};
use alphaminer::data::SyntheticMarket;
use alphaminer::engines::evaluation::{BacktestEvaluator, DegenerateReason};
use alphaminer::engines::generation::InvalidReason;
use alphaminer::engines::metrics::RATIO_CAP;
use alphaminer::types::{PrimaryMetric, Token};
use alphaminer::{AlphaMiner, EvaluationOutcome};
use approx::assert_relative_eq;
use ndarray::Array2;

fn miner_with(config: AppConfig) -> AlphaMiner {
    let features = SyntheticMarket::new(50, 6, 252, 42).generate().unwrap();
    AlphaMiner::new(config, features).unwrap()
}

fn miner() -> AlphaMiner {
    miner_with(AppConfig::default())
}

#[test]
fn test_evaluation_is_deterministic() {
    let first = miner().evaluate("ADD(RET, MA5(VOL))").unwrap();
    let second = miner().evaluate("ADD(RET, MA5(VOL))").unwrap();
    assert_eq!(first, second);

    match first {
        EvaluationOutcome::Scored {
            formula,
            metrics,
            reward,
        } => {
            assert_eq!(formula, "ADD(RET, MA5(VOL))");
            assert!((-1.0..=RATIO_CAP).contains(&reward));
            assert_eq!(reward, metrics.sortino.clamp(-1.0, RATIO_CAP));
            assert!(metrics.max_drawdown >= 0.0 && metrics.max_drawdown <= 1.0);
            assert!(metrics.ic.abs() <= 1.0 && metrics.rank_ic.abs() <= 1.0);
        }
        other => panic!("expected a scored outcome, got {:?}", other),
    }
}

#[test]
fn test_penalties_take_precedence() {
    let miner = miner();
    let reward = &miner.config().reward;

    let invalid = miner.evaluate(Vec::<Token>::new()).unwrap();
    assert!(matches!(
        invalid,
        EvaluationOutcome::Invalid {
            reason: InvalidReason::Empty,
            ..
        }
    ));
    assert_eq!(invalid.reward(), reward.invalid_formula_reward);

    let unknown = miner.evaluate(vec![Token(999)]).unwrap();
    assert_eq!(unknown.reward(), reward.invalid_formula_reward);

    // strictly positive everywhere, so the sign is constant
    let constant = miner.evaluate("SIGN(ABS(ADD(VOL, TURNOVER)))").unwrap();
    assert!(matches!(
        constant,
        EvaluationOutcome::Degenerate {
            reason: DegenerateReason::Constant { .. },
            ..
        }
    ));
    assert_eq!(constant.reward(), reward.constant_factor_reward);

    assert!(reward.invalid_formula_reward <= reward.constant_factor_reward);
    assert!(reward.constant_factor_reward < -1.0);
}

#[test]
fn test_primary_metric_selects_reward() {
    let config = AppConfig {
        reward: RewardConfig {
            primary_metric: PrimaryMetric::RankIc,
            ..RewardConfig::default()
        },
        ..AppConfig::default()
    };
    let outcome = miner_with(config).evaluate("NEG(RET)").unwrap();
    match outcome {
        EvaluationOutcome::Scored { metrics, reward, .. } => assert_eq!(reward, metrics.rank_ic),
        other => panic!("expected a scored outcome, got {:?}", other),
    }
}

#[test]
fn test_sentiment_carries_signal() {
    // next-period returns load on today's sentiment
    let miner = miner_with(AppConfig {
        reward: RewardConfig {
            primary_metric: PrimaryMetric::Ic,
            ..RewardConfig::default()
        },
        features: FeatureConfig {
            enable_sentiment: true,
        },
        ..AppConfig::default()
    });
    let sentiment = miner.evaluate("SENTIMENT").unwrap();
    assert!(sentiment.reward() > 0.1, "{:?}", sentiment);

    let flipped = miner.evaluate("NEG(SENTIMENT)").unwrap();
    assert_relative_eq!(flipped.reward(), -sentiment.reward(), epsilon = 1e-12);
}

#[test]
fn test_flat_factor_backtest_is_flat() {
    let evaluator = BacktestEvaluator::new(RewardConfig::default());
    let factor = Array2::from_elem((10, 4), 1.0);
    let forward = Array2::from_shape_fn((10, 4), |(t, i)| ((t * 7 + i * 3) % 5) as f64 * 0.01 - 0.02);
    let result = evaluator.run(&factor, &forward).unwrap();
    assert!(result.returns.iter().all(|&r| r == 0.0));
    assert_eq!(result.metrics.turnover, 0.0);
    assert_eq!(result.metrics.max_drawdown, 0.0);
}
