use crate::error::{AlphaMinerError, Result};
use ndarray::{s, Array2};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const RET: &str = "RET";
pub const VOL: &str = "VOL";
pub const VOLUME_CHG: &str = "VOLUME_CHG";
pub const TURNOVER: &str = "TURNOVER";
pub const SENTIMENT: &str = "SENTIMENT";
pub const NEWS_COUNT: &str = "NEWS_COUNT";

pub const REQUIRED_FEATURES: [&str; 4] = [RET, VOL, VOLUME_CHG, TURNOVER];
pub const SENTIMENT_FEATURES: [&str; 2] = [SENTIMENT, NEWS_COUNT];

/// Named `(time, instrument)` matrix, shared read-only.
#[derive(Debug, Clone)]
pub struct FeatureTensor {
    pub name: String,
    pub values: Arc<Array2<f64>>,
}

/// Feature tensors aligned on one `(time, instrument)` grid.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    shape: (usize, usize),
    tensors: BTreeMap<String, FeatureTensor>,
    forward_returns: Option<Arc<Array2<f64>>>,
}

impl FeatureSet {
    pub fn new(num_periods: usize, num_instruments: usize) -> Self {
        Self {
            shape: (num_periods, num_instruments),
            tensors: BTreeMap::new(),
            forward_returns: None,
        }
    }

    fn check_shape(&self, name: &str, values: &Array2<f64>) -> Result<()> {
        if values.dim() != self.shape {
            return Err(AlphaMinerError::ShapeMismatch {
                name: name.to_string(),
                expected: self.shape,
                actual: values.dim(),
            });
        }
        Ok(())
    }

    pub fn insert(&mut self, name: &str, values: Array2<f64>) -> Result<()> {
        self.check_shape(name, &values)?;
        let name = name.to_ascii_uppercase();
        self.tensors.insert(
            name.clone(),
            FeatureTensor {
                name,
                values: Arc::new(values),
            },
        );
        Ok(())
    }

    pub fn with_feature(mut self, name: &str, values: Array2<f64>) -> Result<Self> {
        self.insert(name, values)?;
        Ok(self)
    }

    /// Realised return of holding each instrument from `t` to `t + 1`.
    pub fn set_forward_returns(&mut self, values: Array2<f64>) -> Result<()> {
        self.check_shape("forward_returns", &values)?;
        self.forward_returns = Some(Arc::new(values));
        Ok(())
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn num_periods(&self) -> usize {
        self.shape.0
    }

    pub fn num_instruments(&self) -> usize {
        self.shape.1
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(&name.to_ascii_uppercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tensors.keys().map(String::as_str).collect()
    }

    pub fn tensor(&self, name: &str) -> Result<&Array2<f64>> {
        self.tensors
            .get(&name.to_ascii_uppercase())
            .map(|t| t.values.as_ref())
            .ok_or_else(|| AlphaMinerError::UnknownFeature(name.to_string()))
    }

    /// Fails with the first missing name.
    pub fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.contains(name)) {
            Some(missing) => Err(AlphaMinerError::UnknownFeature(missing.to_string())),
            None => Ok(()),
        }
    }

    /// Explicit forward returns, or `RET` shifted one period back with the
    /// last period missing.
    pub fn forward_returns(&self) -> Result<Arc<Array2<f64>>> {
        if let Some(explicit) = &self.forward_returns {
            return Ok(Arc::clone(explicit));
        }

        let ret = self.tensor(RET)?;
        let (periods, _) = self.shape;
        let mut forward = Array2::from_elem(self.shape, f64::NAN);
        if periods > 1 {
            forward
                .slice_mut(s![..periods - 1, ..])
                .assign(&ret.slice(s![1.., ..]));
        }
        Ok(Arc::new(forward))
    }
}
