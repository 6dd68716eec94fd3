use super::features::{
    FeatureSet, NEWS_COUNT, RET, SENTIMENT, TURNOVER, VOL, VOLUME_CHG,
};
use crate::error::{AlphaMinerError, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal, Normal, Poisson};

/// Seeded market simulator with a weak predictable component: returns
/// mean-revert and follow the previous period's sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticMarket {
    pub num_samples: usize,
    pub num_features: usize,
    pub time_steps: usize,
    pub seed: u64,
}

const MEAN_REVERSION: f64 = -0.1;
const SENTIMENT_LOADING: f64 = 0.004;
const SENTIMENT_PERSISTENCE: f64 = 0.8;
const RETURN_NOISE: f64 = 0.01;

impl SyntheticMarket {
    pub fn new(num_samples: usize, num_features: usize, time_steps: usize, seed: u64) -> Self {
        Self {
            num_samples,
            num_features,
            time_steps,
            seed,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(4..=6).contains(&self.num_features) {
            return Err(AlphaMinerError::Configuration(format!(
                "num_features must be between 4 and 6, got {}",
                self.num_features
            )));
        }
        if self.num_samples == 0 || self.time_steps < 2 {
            return Err(AlphaMinerError::Configuration(
                "synthetic market needs at least one instrument and two periods".to_string(),
            ));
        }
        Ok(())
    }

    pub fn generate(&self) -> Result<FeatureSet> {
        self.validate()?;

        let shape = (self.time_steps, self.num_samples);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let noise = Normal::new(0.0, 1.0).map_err(|e| AlphaMinerError::Internal(e.to_string()))?;
        let turnover_dist =
            LogNormal::new(-3.0, 0.3).map_err(|e| AlphaMinerError::Internal(e.to_string()))?;

        let mut ret = Array2::<f64>::zeros(shape);
        let mut vol = Array2::<f64>::zeros(shape);
        let mut volume_chg = Array2::<f64>::zeros(shape);
        let mut turnover = Array2::<f64>::zeros(shape);
        let mut sentiment = Array2::<f64>::zeros(shape);
        let mut news = Array2::<f64>::zeros(shape);

        for t in 0..self.time_steps {
            for i in 0..self.num_samples {
                let (prev_ret, prev_vol, prev_sent) = if t == 0 {
                    (0.0, RETURN_NOISE, 0.0)
                } else {
                    (ret[[t - 1, i]], vol[[t - 1, i]], sentiment[[t - 1, i]])
                };

                let s = SENTIMENT_PERSISTENCE * prev_sent + 0.5 * noise.sample(&mut rng);
                let r = MEAN_REVERSION * prev_ret
                    + SENTIMENT_LOADING * prev_sent
                    + RETURN_NOISE * noise.sample(&mut rng);

                sentiment[[t, i]] = s;
                ret[[t, i]] = r;
                vol[[t, i]] = 0.9 * prev_vol + 0.1 * r.abs();
                volume_chg[[t, i]] = 0.1 * noise.sample(&mut rng) + 2.0 * r.abs();
                turnover[[t, i]] = turnover_dist.sample(&mut rng);

                let lambda = 2.0 + s.abs();
                let poisson =
                    Poisson::new(lambda).map_err(|e| AlphaMinerError::Internal(e.to_string()))?;
                news[[t, i]] = poisson.sample(&mut rng);
            }
        }

        let mut set = FeatureSet::new(self.time_steps, self.num_samples)
            .with_feature(RET, ret)?
            .with_feature(VOL, vol)?
            .with_feature(VOLUME_CHG, volume_chg)?
            .with_feature(TURNOVER, turnover)?;
        if self.num_features >= 5 {
            set.insert(SENTIMENT, sentiment)?;
        }
        if self.num_features >= 6 {
            set.insert(NEWS_COUNT, news)?;
        }

        log::debug!(
            "Generated synthetic market: {} periods x {} instruments, features {:?}",
            self.time_steps,
            self.num_samples,
            set.names()
        );
        Ok(set)
    }
}

impl Default for SyntheticMarket {
    fn default() -> Self {
        Self::new(50, 6, 252, 42)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::features::REQUIRED_FEATURES;

    #[test]
    fn test_generate_shapes_and_features() {
        let set = SyntheticMarket::new(10, 6, 30, 7).generate().unwrap();
        assert_eq!(set.shape(), (30, 10));
        assert!(set.require(&REQUIRED_FEATURES).is_ok());
        assert!(set.contains(SENTIMENT));
        assert!(set.contains(NEWS_COUNT));

        let base = SyntheticMarket::new(10, 4, 30, 7).generate().unwrap();
        assert!(!base.contains(SENTIMENT));
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = SyntheticMarket::new(5, 4, 20, 11).generate().unwrap();
        let b = SyntheticMarket::new(5, 4, 20, 11).generate().unwrap();
        assert_eq!(a.tensor(RET).unwrap(), b.tensor(RET).unwrap());
    }

    #[test]
    fn test_rejects_bad_feature_count() {
        assert!(SyntheticMarket::new(5, 3, 20, 0).generate().is_err());
        assert!(SyntheticMarket::new(5, 7, 20, 0).generate().is_err());
    }
}
