use crate::data::features::FeatureSet;
use crate::engines::generation::program::Program;
use crate::error::{AlphaMinerError, Result};
use crate::functions::operators::OpKind;
use crate::functions::registry::OperatorRegistry;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Thresholds that mark an executed factor as unusable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegeneracyConfig {
    pub max_nan_ratio: f64,
    pub constant_ratio: f64,
    pub variance_epsilon: f64,
}

impl Default for DegeneracyConfig {
    fn default() -> Self {
        Self {
            max_nan_ratio: 0.5,
            constant_ratio: 0.9,
            variance_epsilon: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegenerateReason {
    Empty,
    TooManyMissing { ratio: f64 },
    Constant { ratio: f64 },
    /// Backtest of the factor produced non-finite metrics.
    NonFinite,
}

impl fmt::Display for DegenerateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "factor has no cells"),
            Self::TooManyMissing { ratio } => {
                write!(f, "{:.1}% of cells are missing", ratio * 100.0)
            }
            Self::Constant { ratio } => {
                write!(f, "{:.1}% of periods have no dispersion", ratio * 100.0)
            }
            Self::NonFinite => write!(f, "backtest metrics are not finite"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum VmOutcome {
    Factor(Array2<f64>),
    Degenerate(DegenerateReason),
}

/// Postfix stack machine over feature tensors.
pub struct FactorVm {
    registry: Arc<OperatorRegistry>,
    degeneracy: DegeneracyConfig,
}

impl FactorVm {
    pub fn new(registry: Arc<OperatorRegistry>, degeneracy: DegeneracyConfig) -> Self {
        Self {
            registry,
            degeneracy,
        }
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    /// Execute and classify.
    pub fn execute(&self, program: &Program, features: &FeatureSet) -> Result<VmOutcome> {
        let factor = self.run(program, features)?;
        Ok(match self.classify(&factor) {
            Some(reason) => VmOutcome::Degenerate(reason),
            None => VmOutcome::Factor(factor),
        })
    }

    /// Evaluate `program` to its raw `(time, instrument)` matrix. Feature
    /// leaves are borrowed from `features`; only operator results allocate.
    pub fn run(&self, program: &Program, features: &FeatureSet) -> Result<Array2<f64>> {
        let mut stack: Vec<Cow<'_, Array2<f64>>> = Vec::with_capacity(program.len());

        for (position, token) in program.tokens.iter().enumerate() {
            let op = self.registry.get(*token).ok_or_else(|| {
                log::error!("VM received unknown token {} at {}", token, position);
                AlphaMinerError::Internal(format!("unknown token {} at {}", token, position))
            })?;

            if let OpKind::Feature(name) = op.kind {
                stack.push(Cow::Borrowed(features.tensor(name)?));
                continue;
            }

            let arity = op.arity();
            if stack.len() < arity {
                log::error!(
                    "Stack underflow executing {} at {}: need {}, have {}",
                    op.name,
                    position,
                    arity,
                    stack.len()
                );
                return Err(AlphaMinerError::Internal(format!(
                    "stack underflow at {} ({})",
                    position, op.name
                )));
            }

            let operands = stack.split_off(stack.len() - arity);
            let args: Vec<&Array2<f64>> = operands.iter().map(|c| c.as_ref()).collect();
            let result = op.kind.apply(&args)?;
            stack.push(Cow::Owned(result));
        }

        let residue = stack.len();
        match stack.pop() {
            Some(value) if residue == 1 => Ok(value.into_owned()),
            _ => {
                log::error!("VM finished with {} values on the stack", residue);
                Err(AlphaMinerError::Internal(format!(
                    "stack residue: {} values",
                    residue
                )))
            }
        }
    }

    pub fn classify(&self, factor: &Array2<f64>) -> Option<DegenerateReason> {
        let total = factor.len();
        if total == 0 {
            return Some(DegenerateReason::Empty);
        }

        let missing = factor.iter().filter(|v| !v.is_finite()).count();
        let nan_ratio = missing as f64 / total as f64;
        if nan_ratio > self.degeneracy.max_nan_ratio {
            return Some(DegenerateReason::TooManyMissing { ratio: nan_ratio });
        }

        let eps = self.degeneracy.variance_epsilon;
        let (periods, instruments) = factor.dim();
        if instruments == 1 {
            let column: Vec<f64> = factor.iter().copied().filter(|v| v.is_finite()).collect();
            return if is_flat(&column, eps) {
                Some(DegenerateReason::Constant { ratio: 1.0 })
            } else {
                None
            };
        }

        let flat_rows = factor
            .axis_iter(Axis(0))
            .filter(|row| {
                let finite: Vec<f64> = row.iter().copied().filter(|v| v.is_finite()).collect();
                is_flat(&finite, eps)
            })
            .count();
        let ratio = flat_rows as f64 / periods as f64;
        if ratio >= self.degeneracy.constant_ratio {
            return Some(DegenerateReason::Constant { ratio });
        }
        None
    }
}

fn is_flat(values: &[f64], eps: f64) -> bool {
    if values.len() < 2 {
        return true;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt() <= eps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::{RET, TURNOVER, VOL, VOLUME_CHG};
    use crate::engines::generation::parser::parse_formula;
    use ndarray::array;

    fn features() -> FeatureSet {
        let ret = array![[0.01, -0.02, 0.03], [0.02, 0.01, -0.01], [-0.01, 0.0, 0.02]];
        let vol = array![[1.0, 2.0, 3.0], [1.5, 2.5, 3.5], [2.0, 3.0, 4.0]];
        FeatureSet::new(3, 3)
            .with_feature(RET, ret)
            .unwrap()
            .with_feature(VOL, vol)
            .unwrap()
            .with_feature(VOLUME_CHG, Array2::zeros((3, 3)))
            .unwrap()
            .with_feature(TURNOVER, Array2::ones((3, 3)))
            .unwrap()
    }

    fn vm() -> FactorVm {
        FactorVm::new(Arc::new(OperatorRegistry::default()), DegeneracyConfig::default())
    }

    #[test]
    fn test_run_arithmetic() {
        let vm = vm();
        let set = features();
        let program = parse_formula("SUB(VOL, RET)", vm.registry()).unwrap();
        let out = vm.run(&program, &set).unwrap();
        assert!((out[[0, 1]] - 2.02).abs() < 1e-12);
    }

    #[test]
    fn test_constant_factor_is_degenerate() {
        let vm = vm();
        let program = parse_formula("TURNOVER", vm.registry()).unwrap();
        match vm.execute(&program, &features()).unwrap() {
            VmOutcome::Degenerate(DegenerateReason::Constant { ratio }) => assert_eq!(ratio, 1.0),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_long_window_is_mostly_missing() {
        let vm = vm();
        let program = parse_formula("MA20(RET)", vm.registry()).unwrap();
        assert!(matches!(
            vm.execute(&program, &features()).unwrap(),
            VmOutcome::Degenerate(DegenerateReason::TooManyMissing { .. })
        ));
    }

    #[test]
    fn test_residue_is_internal_error() {
        let vm = vm();
        let registry = vm.registry().clone();
        let program = Program::new(vec![
            registry.token_of(RET).unwrap(),
            registry.token_of(VOL).unwrap(),
        ]);
        assert!(matches!(
            vm.run(&program, &features()),
            Err(AlphaMinerError::Internal(_))
        ));
    }

    #[test]
    fn test_missing_feature_is_reported() {
        let vm = FactorVm::new(Arc::new(OperatorRegistry::new(true)), DegeneracyConfig::default());
        let program = parse_formula("SENTIMENT", vm.registry()).unwrap();
        assert!(matches!(
            vm.run(&program, &features()),
            Err(AlphaMinerError::UnknownFeature(_))
        ));
    }

    #[test]
    fn test_single_instrument_uses_time_series_dispersion() {
        let vm = vm();
        assert!(vm.classify(&array![[1.0], [2.0], [3.0]]).is_none());
        assert_eq!(
            vm.classify(&array![[1.0], [1.0], [1.0]]),
            Some(DegenerateReason::Constant { ratio: 1.0 })
        );
    }
}
