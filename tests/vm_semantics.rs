use alphaminer::data::features::{RET, TURNOVER, VOL, VOLUME_CHG};
use alphaminer::data::{FeatureSet, SyntheticMarket};
use alphaminer::engines::evaluation::{DegeneracyConfig, FactorVm, VmOutcome};
use alphaminer::engines::generation::parse_formula;
use alphaminer::functions::primitives::DIV_EPSILON;
use alphaminer::functions::OperatorRegistry;
use approx::assert_relative_eq;
use ndarray::{array, Array2};
use std::sync::Arc;

fn panel() -> FeatureSet {
    // 6 periods x 3 instruments
    let ret = array![
        [0.01, -0.02, 0.00],
        [0.02, 0.01, -0.01],
        [-0.01, 0.00, 0.02],
        [0.03, -0.01, 0.01],
        [0.00, 0.02, -0.02],
        [0.01, 0.01, 0.00]
    ];
    let vol = Array2::from_shape_fn((6, 3), |(t, i)| (t + 1) as f64 * (i + 1) as f64);
    FeatureSet::new(6, 3)
        .with_feature(RET, ret)
        .unwrap()
        .with_feature(VOL, vol)
        .unwrap()
        .with_feature(VOLUME_CHG, Array2::zeros((6, 3)))
        .unwrap()
        .with_feature(TURNOVER, Array2::from_elem((6, 3), 0.05))
        .unwrap()
}

fn run(formula: &str) -> Array2<f64> {
    let registry = Arc::new(OperatorRegistry::default());
    let vm = FactorVm::new(Arc::clone(&registry), DegeneracyConfig::default());
    let program = parse_formula(formula, &registry).unwrap();
    vm.run(&program, &panel()).unwrap()
}

#[test]
fn test_division_by_zero_stays_finite() {
    let out = run("DIV(TURNOVER, VOLUME_CHG)");
    assert!(out.iter().all(|v| v.is_finite()));
    assert_relative_eq!(out[[0, 0]], 0.05 / DIV_EPSILON, max_relative = 1e-12);

    let zero_over_zero = run("DIV(VOLUME_CHG, VOLUME_CHG)");
    assert!(zero_over_zero.iter().all(|&v| v == 0.0));
}

#[test]
fn test_windowed_operators_mark_missing_history() {
    let delayed = run("DELAY1(RET)");
    assert!(delayed.row(0).iter().all(|v| v.is_nan()));
    assert_eq!(delayed[[1, 1]], -0.02);

    let ma = run("MA5(VOL)");
    for t in 0..4 {
        assert!(ma.row(t).iter().all(|v| v.is_nan()));
    }
    // VOL in column 0 is 1..=6
    assert_relative_eq!(ma[[4, 0]], 3.0, epsilon = 1e-12);
    assert_relative_eq!(ma[[5, 0]], 4.0, epsilon = 1e-12);

    let delta = run("DELTA1(VOL)");
    assert_relative_eq!(delta[[3, 2]], 3.0, epsilon = 1e-12);
}

#[test]
fn test_missing_values_propagate_through_operators() {
    let out = run("ADD(DELAY1(RET), RET)");
    assert!(out.row(0).iter().all(|v| v.is_nan()));

    let max = run("MAX(DELAY1(RET), RET)");
    assert!(max.row(0).iter().all(|v| v.is_nan()));
    assert_eq!(max[[1, 0]], 0.02);
}

#[test]
fn test_cross_sectional_operators_ignore_missing_cells() {
    let ranked = run("RANK(VOL)");
    for row in ranked.rows() {
        let values: Vec<f64> = row.to_vec();
        assert!(values[0] < values[1] && values[1] < values[2]);
        assert_relative_eq!(values[2], 1.0, epsilon = 1e-12);
    }

    let z = run("ZSCORE(DELAY1(VOL))");
    assert!(z.row(0).iter().all(|v| v.is_nan()));
    assert_relative_eq!(z.row(3).sum(), 0.0, epsilon = 1e-9);
}

#[test]
fn test_gate_selects_by_condition_sign() {
    let out = run("GATE(RET, VOL, NEG(VOL))");
    assert_eq!(out[[0, 0]], 1.0);
    assert_eq!(out[[0, 1]], -2.0);
    // zero condition is not positive
    assert_eq!(out[[0, 2]], -3.0);
}

#[test]
fn test_generated_market_factors_are_classified() {
    let registry = Arc::new(OperatorRegistry::new(true));
    let vm = FactorVm::new(Arc::clone(&registry), DegeneracyConfig::default());
    let features = SyntheticMarket::new(20, 6, 80, 3).generate().unwrap();

    for formula in ["RET", "SUB(RET, MA5(RET))", "MUL(SENTIMENT, RANK(VOL))"] {
        let program = parse_formula(formula, &registry).unwrap();
        match vm.execute(&program, &features).unwrap() {
            VmOutcome::Factor(values) => assert_eq!(values.dim(), (80, 20)),
            VmOutcome::Degenerate(reason) => panic!("{} degenerate: {}", formula, reason),
        }
    }

    let constant = parse_formula("SIGN(ABS(ADD(TURNOVER, VOL)))", &registry).unwrap();
    assert!(matches!(
        vm.execute(&constant, &features).unwrap(),
        VmOutcome::Degenerate(_)
    ));
}
