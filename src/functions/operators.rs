use crate::error::{AlphaMinerError, Result};
use crate::functions::{primitives, timeseries};
use crate::types::Token;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorCategory {
    Arithmetic,
    Unary,
    TimeSeries,
    Conditional,
    Special,
    Leaf,
}

/// Closed set of kernels. Windowed variants carry their window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
    Abs,
    Sign,
    Gate,
    Max,
    Min,
    Delay(usize),
    Delta(usize),
    Mean(usize),
    Std(usize),
    Decay(usize),
    TsMax(usize),
    Rank,
    ZScore,
    Feature(&'static str),
}

impl OpKind {
    pub fn arity(&self) -> usize {
        match self {
            Self::Feature(_) => 0,
            Self::Neg | Self::Abs | Self::Sign | Self::Rank | Self::ZScore => 1,
            Self::Delay(_)
            | Self::Delta(_)
            | Self::Mean(_)
            | Self::Std(_)
            | Self::Decay(_)
            | Self::TsMax(_) => 1,
            Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Max | Self::Min => 2,
            Self::Gate => 3,
        }
    }

    pub fn category(&self) -> OperatorCategory {
        match self {
            Self::Add | Self::Sub | Self::Mul | Self::Div => OperatorCategory::Arithmetic,
            Self::Neg | Self::Abs | Self::Sign => OperatorCategory::Unary,
            Self::Gate | Self::Max | Self::Min => OperatorCategory::Conditional,
            Self::Delay(_)
            | Self::Delta(_)
            | Self::Mean(_)
            | Self::Std(_)
            | Self::Decay(_)
            | Self::TsMax(_) => OperatorCategory::TimeSeries,
            Self::Rank | Self::ZScore => OperatorCategory::Special,
            Self::Feature(_) => OperatorCategory::Leaf,
        }
    }

    /// Apply the kernel to already-evaluated operands (in push order).
    pub fn apply(&self, args: &[&Array2<f64>]) -> Result<Array2<f64>> {
        if args.len() != self.arity() {
            return Err(AlphaMinerError::Internal(format!(
                "{:?} expects {} operands, got {}",
                self,
                self.arity(),
                args.len()
            )));
        }

        let out = match self {
            Self::Add => primitives::add(args[0], args[1]),
            Self::Sub => primitives::sub(args[0], args[1]),
            Self::Mul => primitives::mul(args[0], args[1]),
            Self::Div => primitives::div(args[0], args[1]),
            Self::Neg => primitives::neg(args[0]),
            Self::Abs => primitives::abs(args[0]),
            Self::Sign => primitives::sign(args[0]),
            Self::Gate => primitives::gate(args[0], args[1], args[2]),
            Self::Max => primitives::max(args[0], args[1]),
            Self::Min => primitives::min(args[0], args[1]),
            Self::Delay(k) => timeseries::delay(args[0], *k),
            Self::Delta(k) => timeseries::delta(args[0], *k),
            Self::Mean(w) => timeseries::mean(args[0], *w),
            Self::Std(w) => timeseries::std(args[0], *w),
            Self::Decay(w) => timeseries::decay_linear(args[0], *w),
            Self::TsMax(w) => timeseries::ts_max(args[0], *w),
            Self::Rank => primitives::cs_rank(args[0]),
            Self::ZScore => primitives::cs_zscore(args[0]),
            Self::Feature(name) => {
                return Err(AlphaMinerError::Internal(format!(
                    "feature leaf {} has no kernel",
                    name
                )))
            }
        };
        Ok(out)
    }
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub token: Token,
    pub name: &'static str,
    pub kind: OpKind,
}

impl Operator {
    pub fn arity(&self) -> usize {
        self.kind.arity()
    }

    pub fn category(&self) -> OperatorCategory {
        self.kind.category()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, OpKind::Feature(_))
    }

    pub fn feature_name(&self) -> Option<&'static str> {
        match self.kind {
            OpKind::Feature(name) => Some(name),
            _ => None,
        }
    }
}
