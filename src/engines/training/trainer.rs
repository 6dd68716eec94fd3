use super::hall_of_fame::HallOfFame;
use super::progress::{CancellationToken, FactorSink};
use crate::config::AppConfig;
use crate::data::features::FeatureSet;
use crate::engines::evaluation::{Assessment, BacktestEvaluator, FactorVm, ProgramScorer};
use crate::engines::generation::policy::policy_gradient_logits;
use crate::engines::generation::{
    Adam, Draw, FormulaGenerator, Grammar, PolicyNetwork, PolicyShape, ProgramValidator,
    SampledProgram,
};
use crate::error::{AlphaMinerError, Result};
use crate::functions::registry::OperatorRegistry;
use crate::types::{DiscoveredFactor, Metrics, TrainingStepRecord};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrainerState {
    Idle,
    Running { step: usize },
    Completed,
    Aborted,
    /// A step failed. Features and shapes are checked when the run is
    /// built, so only internal invariant violations (policy sampling, VM
    /// stack) land here.
    Error { message: String },
}

impl TrainerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Error { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub best_score: Option<f64>,
    pub best_formula: Option<String>,
    pub best_metrics: Option<Metrics>,
    pub total_steps: usize,
    pub state: TrainerState,
    pub hall_of_fame: Vec<DiscoveredFactor>,
}

/// One REINFORCE run: owns the policy, optimizer, RNG, step counter and
/// best-so-far. Runs never share mutable state.
pub struct TrainingRun {
    num_steps: usize,
    batch_size: usize,
    entropy_coef: f64,
    baseline_decay: f64,
    max_grad_norm: f64,
    generator: FormulaGenerator,
    policy: PolicyNetwork,
    optimizer: Adam,
    scorer: ProgramScorer,
    rng: StdRng,
    baseline: Option<f64>,
    step: usize,
    state: TrainerState,
    records: Vec<TrainingStepRecord>,
    best: Option<DiscoveredFactor>,
    hall_of_fame: HallOfFame,
    sinks: Vec<Box<dyn FactorSink>>,
}

impl TrainingRun {
    pub fn new(
        config: &AppConfig,
        registry: Arc<OperatorRegistry>,
        features: Arc<FeatureSet>,
    ) -> Result<Self> {
        config.validate()?;
        features.require(&registry.feature_names())?;

        let model = &config.model;
        let training = &config.training;
        let mut rng = match training.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let shape = PolicyShape {
            vocab_size: registry.len(),
            max_seq_len: model.max_seq_len,
            d_model: model.d_model,
            nhead: model.nhead,
            num_layers: model.num_layers,
        };
        let policy = PolicyNetwork::new(shape, &mut rng)?;
        let optimizer = Adam::new(training.learning_rate, policy.params());

        let generator = FormulaGenerator::new(
            Grammar::new(&registry, model.max_seq_len),
            ProgramValidator::new(Arc::clone(&registry), model.max_seq_len),
        );
        let scorer = ProgramScorer::new(
            FactorVm::new(Arc::clone(&registry), config.reward.degeneracy()),
            BacktestEvaluator::new(config.reward.clone()),
            features,
        )?;

        log::info!(
            "Training run prepared: {} steps x {} programs, vocabulary {}, max length {}",
            training.num_steps,
            training.batch_size,
            registry.len(),
            model.max_seq_len
        );

        Ok(Self {
            num_steps: training.num_steps,
            batch_size: training.batch_size,
            entropy_coef: training.entropy_coef,
            baseline_decay: training.baseline_decay,
            max_grad_norm: training.max_grad_norm,
            generator,
            policy,
            optimizer,
            scorer,
            rng,
            baseline: None,
            step: 0,
            state: TrainerState::Idle,
            records: Vec::new(),
            best: None,
            hall_of_fame: HallOfFame::new(training.hall_of_fame_size),
            sinks: Vec::new(),
        })
    }

    pub fn add_sink(&mut self, sink: Box<dyn FactorSink>) {
        self.sinks.push(sink);
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn records(&self) -> &[TrainingStepRecord] {
        &self.records
    }

    /// Records from the first step, for observers that join late.
    pub fn replay(&self) -> std::slice::Iter<'_, TrainingStepRecord> {
        self.records.iter()
    }

    pub fn best(&self) -> Option<&DiscoveredFactor> {
        self.best.as_ref()
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn policy(&self) -> &PolicyNetwork {
        &self.policy
    }

    pub fn generator(&self) -> &FormulaGenerator {
        &self.generator
    }

    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            best_score: self.best.as_ref().map(|b| b.reward),
            best_formula: self.best.as_ref().map(|b| b.formula.clone()),
            best_metrics: self.best.as_ref().map(|b| b.metrics),
            total_steps: self.records.len(),
            state: self.state.clone(),
            hall_of_fame: self.hall_of_fame.get_all().to_vec(),
        }
    }

    /// Finite stream of step records; stops after `num_steps`, on
    /// cancellation, or after the first error.
    pub fn steps<'a>(&'a mut self, cancel: &'a CancellationToken) -> Steps<'a> {
        Steps { run: self, cancel }
    }

    /// Drive the run to the end, handing every record to `on_record`.
    pub fn run<F>(&mut self, cancel: &CancellationToken, mut on_record: F) -> Result<TrainingSummary>
    where
        F: FnMut(&TrainingStepRecord),
    {
        for record in self.steps(cancel) {
            on_record(&record?);
        }
        Ok(self.summary())
    }

    /// One sample, score, update cycle.
    pub fn step(&mut self) -> Result<TrainingStepRecord> {
        if self.state.is_terminal() {
            return Err(AlphaMinerError::Internal(format!(
                "step requested on a finished run ({:?})",
                self.state
            )));
        }
        self.state = TrainerState::Running { step: self.step };

        match self.step_inner() {
            Ok(record) => {
                self.step += 1;
                if self.step >= self.num_steps {
                    self.state = TrainerState::Completed;
                    log::info!("Training completed after {} steps", self.step);
                }
                Ok(record)
            }
            Err(e) => {
                log::error!("Training step {} failed: {}", self.step, e);
                self.state = TrainerState::Error {
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    fn step_inner(&mut self) -> Result<TrainingStepRecord> {
        let step = self.step;
        let samples = self
            .generator
            .generate(&self.policy, self.batch_size, &mut self.rng)?;

        let scorer = &self.scorer;
        let assessments: Vec<Assessment> = samples
            .par_iter()
            .map(|sample| scorer.assess_draw(&sample.draw))
            .collect::<Result<Vec<_>>>()?;

        let batch = samples.len().max(1) as f64;
        let rewards: Vec<f64> = assessments.iter().map(Assessment::reward).collect();
        let avg_reward = rewards.iter().sum::<f64>() / batch;
        let max_reward = rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let valid = samples.iter().filter(|s| s.is_valid()).count();
        let valid_ratio = valid as f64 / batch;

        for (sample, assessment) in samples.iter().zip(&assessments) {
            log::debug!(
                "step {} draw {}: reward {:.4}",
                step,
                sample.formula().unwrap_or("<rejected>"),
                assessment.reward()
            );
        }
        let degenerate = assessments
            .iter()
            .filter(|a| matches!(a, Assessment::Degenerate { .. }))
            .count();
        if degenerate * 2 > samples.len() {
            log::warn!(
                "Step {}: {} of {} programs degenerate",
                step,
                degenerate,
                samples.len()
            );
        }

        let baseline = match self.baseline {
            None => avg_reward,
            Some(prev) => self.baseline_decay * prev + (1.0 - self.baseline_decay) * avg_reward,
        };
        self.baseline = Some(baseline);

        let loss = self.update_policy(&samples, &rewards, baseline);

        self.track_best(step, &samples, &assessments);

        let record = TrainingStepRecord {
            step,
            avg_reward,
            max_reward,
            loss,
            valid_ratio,
            best_score: self.best.as_ref().map(|b| b.reward),
            best_formula: self.best.as_ref().map(|b| b.formula.clone()),
        };
        log::info!(
            "Step {}/{}: avg {:.4}, max {:.4}, loss {:.4}, valid {:.2}, best {:?}",
            step + 1,
            self.num_steps,
            avg_reward,
            max_reward,
            loss,
            valid_ratio,
            record.best_formula
        );
        self.records.push(record.clone());
        Ok(record)
    }

    /// Accumulate the REINFORCE gradient with entropy bonus and apply one
    /// clipped Adam step. Returns the batch loss; the update is skipped when
    /// either the loss or the gradient is not finite.
    fn update_policy(&mut self, samples: &[SampledProgram], rewards: &[f64], baseline: f64) -> f64 {
        let batch = samples.len().max(1) as f64;
        let entropy_scale = self.entropy_coef / batch;

        let mut loss = 0.0;
        let mut grads = self.policy.zero_grads();
        for (sample, &reward) in samples.iter().zip(rewards) {
            let advantage = reward - baseline;
            loss -= advantage * sample.log_prob() / batch;
            loss -= self.entropy_coef * sample.entropy / batch;

            for (trace, &action) in sample.traces().iter().zip(&sample.actions) {
                let dlogits =
                    policy_gradient_logits(trace, action, advantage / batch, entropy_scale);
                self.policy.accumulate_gradients(trace, &dlogits, &mut grads);
            }
        }

        let norm = grads.global_norm();
        if !loss.is_finite() || !norm.is_finite() {
            log::warn!("Skipping update: loss {} gradient norm {}", loss, norm);
            return loss;
        }
        if norm > self.max_grad_norm {
            grads.scale(self.max_grad_norm / norm);
        }
        self.optimizer.step(self.policy.params_mut(), &grads);
        loss
    }

    fn track_best(&mut self, step: usize, samples: &[SampledProgram], assessments: &[Assessment]) {
        let mut candidate: Option<(&str, f64, Metrics)> = None;

        for (sample, assessment) in samples.iter().zip(assessments) {
            let (formula, metrics, reward) = match (&sample.draw, assessment) {
                (Draw::Valid { formula, .. }, Assessment::Scored { metrics, reward }) => {
                    (formula.as_str(), *metrics, *reward)
                }
                _ => continue,
            };

            self.hall_of_fame.try_add(DiscoveredFactor {
                formula: formula.to_string(),
                reward,
                metrics,
                step,
                discovered_at: Utc::now(),
            });

            if candidate.map_or(true, |(_, best, _)| reward > best) {
                candidate = Some((formula, reward, metrics));
            }
        }

        let Some((formula, reward, metrics)) = candidate else {
            return;
        };
        if self.best.as_ref().map_or(false, |b| b.reward >= reward) {
            return;
        }

        let factor = DiscoveredFactor {
            formula: formula.to_string(),
            reward,
            metrics,
            step,
            discovered_at: Utc::now(),
        };
        log::info!("New best at step {}: {} ({:.4})", step, factor.formula, reward);
        for sink in self.sinks.iter_mut() {
            sink.on_factor(&factor);
        }
        self.best = Some(factor);
    }
}

/// Iterator returned by [`TrainingRun::steps`].
pub struct Steps<'a> {
    run: &'a mut TrainingRun,
    cancel: &'a CancellationToken,
}

impl Iterator for Steps<'_> {
    type Item = Result<TrainingStepRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.run.state.is_terminal() {
            return None;
        }
        if self.run.step >= self.run.num_steps {
            self.run.state = TrainerState::Completed;
            return None;
        }
        if self.cancel.is_cancelled() {
            log::info!(
                "Training cancelled after {} of {} steps",
                self.run.step,
                self.run.num_steps
            );
            self.run.state = TrainerState::Aborted;
            return None;
        }
        Some(self.run.step())
    }
}
