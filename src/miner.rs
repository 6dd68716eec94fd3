use crate::config::AppConfig;
use crate::data::features::FeatureSet;
use crate::engines::evaluation::{
    Assessment, BacktestEvaluator, DegenerateReason, FactorVm, ProgramScorer,
};
use crate::engines::generation::{
    count_names, parse_formula, InvalidReason, Program, ProgramValidator, Validation,
};
use crate::engines::training::{TrainingRun, TrainingRunner};
use crate::error::Result;
use crate::functions::registry::OperatorRegistry;
use crate::types::{Metrics, Token};
use serde::Serialize;
use std::sync::Arc;

/// A formula as text (`ADD(RET, MA5(VOL))`) or as postfix token ids.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaInput {
    Text(String),
    Tokens(Vec<Token>),
}

impl From<&str> for FormulaInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<Token>> for FormulaInput {
    fn from(tokens: Vec<Token>) -> Self {
        Self::Tokens(tokens)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Scored {
        formula: String,
        metrics: Metrics,
        reward: f64,
    },
    Invalid {
        reason: InvalidReason,
        reward: f64,
    },
    Degenerate {
        formula: String,
        reason: DegenerateReason,
        reward: f64,
    },
}

impl EvaluationOutcome {
    pub fn reward(&self) -> f64 {
        match self {
            Self::Scored { reward, .. }
            | Self::Invalid { reward, .. }
            | Self::Degenerate { reward, .. } => *reward,
        }
    }

    pub fn formula(&self) -> Option<&str> {
        match self {
            Self::Scored { formula, .. } | Self::Degenerate { formula, .. } => Some(formula),
            Self::Invalid { .. } => None,
        }
    }
}

/// Per-call overrides of the training section. `None` keeps the configured
/// value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainOptions {
    pub num_steps: Option<usize>,
    pub batch_size: Option<usize>,
    pub use_sentiment: Option<bool>,
    pub seed: Option<u64>,
}

impl TrainOptions {
    pub fn new(num_steps: usize, batch_size: usize) -> Self {
        Self {
            num_steps: Some(num_steps),
            batch_size: Some(batch_size),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_sentiment(mut self, enabled: bool) -> Self {
        self.use_sentiment = Some(enabled);
        self
    }
}

/// Entry point tying a configuration to one feature set. Evaluation is
/// read-only and may be called from several threads; each training run gets
/// its own policy, optimizer and RNG.
pub struct AlphaMiner {
    config: AppConfig,
    registry: Arc<OperatorRegistry>,
    features: Arc<FeatureSet>,
    validator: ProgramValidator,
    scorer: ProgramScorer,
}

impl AlphaMiner {
    pub fn new(config: AppConfig, features: FeatureSet) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(OperatorRegistry::new(config.features.enable_sentiment));
        let features = Arc::new(features);
        features.require(&registry.feature_names())?;

        let validator = ProgramValidator::new(Arc::clone(&registry), config.model.max_seq_len);
        let scorer = ProgramScorer::new(
            FactorVm::new(Arc::clone(&registry), config.reward.degeneracy()),
            BacktestEvaluator::new(config.reward.clone()),
            Arc::clone(&features),
        )?;

        log::info!(
            "Miner ready: {} operators over {} periods x {} instruments",
            registry.len(),
            features.num_periods(),
            features.num_instruments()
        );

        Ok(Self {
            config,
            registry,
            features,
            validator,
            scorer,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    pub fn features(&self) -> &Arc<FeatureSet> {
        &self.features
    }

    /// Parse a text formula against this miner's vocabulary.
    pub fn parse(&self, formula: &str) -> Result<Program> {
        parse_formula(formula, &self.registry)
    }

    /// Score one formula. Text that does not parse is an error; token
    /// sequences that fail validation, and text with more names than
    /// `max_seq_len`, come back as `Invalid`.
    pub fn evaluate(&self, input: impl Into<FormulaInput>) -> Result<EvaluationOutcome> {
        let program = match input.into() {
            FormulaInput::Text(text) => {
                let names = count_names(&text);
                if names > self.validator.max_seq_len() {
                    return Ok(self.invalid(InvalidReason::TooLong {
                        len: names,
                        max: self.validator.max_seq_len(),
                    }));
                }
                self.parse(&text)?
            }
            FormulaInput::Tokens(tokens) => Program::new(tokens),
        };

        let formula = match self.validator.validate(&program) {
            Validation::Valid(formula) => formula,
            Validation::Invalid(reason) => return Ok(self.invalid(reason)),
        };

        Ok(match self.scorer.assess(&program)? {
            Assessment::Scored { metrics, reward } => EvaluationOutcome::Scored {
                formula,
                metrics,
                reward,
            },
            Assessment::Degenerate { reason, reward } => EvaluationOutcome::Degenerate {
                formula,
                reason,
                reward,
            },
            Assessment::Invalid { reason, reward } => EvaluationOutcome::Invalid { reason, reward },
        })
    }

    fn invalid(&self, reason: InvalidReason) -> EvaluationOutcome {
        EvaluationOutcome::Invalid {
            reason,
            reward: self.scorer.evaluator().invalid_penalty(),
        }
    }

    /// Prepare a training run; iterate it with [`TrainingRun::steps`].
    pub fn train(&self, options: TrainOptions) -> Result<TrainingRun> {
        let mut config = self.config.clone();
        if let Some(num_steps) = options.num_steps {
            config.training.num_steps = num_steps;
        }
        if let Some(batch_size) = options.batch_size {
            config.training.batch_size = batch_size;
        }
        if let Some(seed) = options.seed {
            config.training.seed = Some(seed);
        }

        let registry = match options.use_sentiment {
            Some(enabled) if enabled != self.registry.sentiment_enabled() => {
                config.features.enable_sentiment = enabled;
                Arc::new(OperatorRegistry::new(enabled))
            }
            _ => Arc::clone(&self.registry),
        };

        TrainingRun::new(&config, registry, Arc::clone(&self.features))
    }

    /// Same as [`AlphaMiner::train`] but on a background thread.
    pub fn spawn_training(&self, options: TrainOptions) -> Result<TrainingRunner> {
        TrainingRunner::start(self.train(options)?)
    }
}
