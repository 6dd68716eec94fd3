use super::progress::FactorSink;
use crate::types::DiscoveredFactor;
use std::collections::HashSet;

/// Top-K distinct formulas by reward. Formulas are deduplicated on their
/// canonical rendering.
pub struct HallOfFame {
    factors: Vec<DiscoveredFactor>,
    max_size: usize,
    seen_signatures: HashSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            factors: Vec::new(),
            max_size,
            seen_signatures: HashSet::new(),
        }
    }

    /// Attempt to add a factor; `false` for duplicates and non-finite rewards.
    pub fn try_add(&mut self, factor: DiscoveredFactor) -> bool {
        if !factor.reward.is_finite() || self.max_size == 0 {
            return false;
        }
        if self.seen_signatures.contains(&factor.formula) {
            return false;
        }
        if self.factors.len() >= self.max_size
            && self
                .factors
                .last()
                .map_or(false, |worst| worst.reward >= factor.reward)
        {
            return false;
        }

        self.seen_signatures.insert(factor.formula.clone());
        self.factors.push(factor);
        self.sort_and_trim();
        true
    }

    fn sort_and_trim(&mut self) {
        // Sort by reward (descending); earlier discoveries win ties
        self.factors.sort_by(|a, b| {
            b.reward
                .partial_cmp(&a.reward)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.step.cmp(&b.step))
        });

        while self.factors.len() > self.max_size {
            if let Some(removed) = self.factors.pop() {
                self.seen_signatures.remove(&removed.formula);
            }
        }
    }

    pub fn get_all(&self) -> &[DiscoveredFactor] {
        &self.factors
    }

    pub fn get_top_n(&self, n: usize) -> &[DiscoveredFactor] {
        &self.factors[..n.min(self.factors.len())]
    }

    pub fn best(&self) -> Option<&DiscoveredFactor> {
        self.factors.first()
    }

    pub fn filter_by_threshold(&self, min_reward: f64) -> Vec<DiscoveredFactor> {
        self.factors
            .iter()
            .filter(|f| f.reward >= min_reward)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl FactorSink for HallOfFame {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        self.try_add(factor.clone());
    }
}
