use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifier of one registry entry (operator or feature leaf).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub u16);

impl Token {
    pub fn new(index: usize) -> Self {
        Self(index as u16)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metric used as the training reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMetric {
    #[default]
    Sortino,
    Sharpe,
    Ic,
    RankIc,
}

/// Backtest metrics of one factor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    pub sortino: f64,
    pub sharpe: f64,
    pub ic: f64,
    pub rank_ic: f64,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub mean_return: f64,
}

impl Metrics {
    pub fn get(&self, metric: PrimaryMetric) -> f64 {
        match metric {
            PrimaryMetric::Sortino => self.sortino,
            PrimaryMetric::Sharpe => self.sharpe,
            PrimaryMetric::Ic => self.ic,
            PrimaryMetric::RankIc => self.rank_ic,
        }
    }

    pub fn to_map(&self) -> HashMap<String, f64> {
        let mut metrics = HashMap::new();
        metrics.insert("sortino_ratio".to_string(), self.sortino);
        metrics.insert("sharpe_ratio".to_string(), self.sharpe);
        metrics.insert("ic".to_string(), self.ic);
        metrics.insert("rank_ic".to_string(), self.rank_ic);
        metrics.insert("max_drawdown".to_string(), self.max_drawdown);
        metrics.insert("turnover".to_string(), self.turnover);
        metrics.insert("mean_return".to_string(), self.mean_return);
        metrics
    }
}

/// One completed training step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStepRecord {
    pub step: usize,
    pub avg_reward: f64,
    pub max_reward: f64,
    pub loss: f64,
    pub valid_ratio: f64,
    pub best_score: Option<f64>,
    pub best_formula: Option<String>,
}

/// A formula worth keeping, handed to whoever persists factors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredFactor {
    pub formula: String,
    pub reward: f64,
    pub metrics: Metrics,
    pub step: usize,
    pub discovered_at: DateTime<Utc>,
}
