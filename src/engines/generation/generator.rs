use super::grammar::{DecodeState, Grammar};
use super::policy::{PolicyNetwork, StepTrace};
use super::program::Program;
use super::validator::{InvalidReason, ProgramValidator, Validation};
use crate::error::{AlphaMinerError, Result};
use crate::types::Token;
use rand::Rng;

/// Outcome of one decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Draw {
    Valid { program: Program, formula: String },
    Rejected(InvalidReason),
}

/// One sampled sequence with what the trainer needs to reinforce it.
#[derive(Debug, Clone)]
pub struct SampledProgram {
    pub draw: Draw,
    /// Chosen actions including the terminating STOP, if one was drawn.
    pub actions: Vec<usize>,
    pub log_probs: Vec<f64>,
    pub entropy: f64,
    pub(crate) traces: Vec<StepTrace>,
}

impl SampledProgram {
    pub fn is_valid(&self) -> bool {
        matches!(self.draw, Draw::Valid { .. })
    }

    pub fn formula(&self) -> Option<&str> {
        match &self.draw {
            Draw::Valid { formula, .. } => Some(formula),
            Draw::Rejected(_) => None,
        }
    }

    pub fn log_prob(&self) -> f64 {
        self.log_probs.iter().sum()
    }

    pub fn traces(&self) -> &[StepTrace] {
        &self.traces
    }
}

/// Grammar-masked sampler over the policy network.
pub struct FormulaGenerator {
    grammar: Grammar,
    validator: ProgramValidator,
}

impl FormulaGenerator {
    pub fn new(grammar: Grammar, validator: ProgramValidator) -> Self {
        Self { grammar, validator }
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn validator(&self) -> &ProgramValidator {
        &self.validator
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        policy: &PolicyNetwork,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Vec<SampledProgram>> {
        (0..batch_size)
            .map(|_| self.sample_one(policy, rng))
            .collect()
    }

    fn sample_one<R: Rng + ?Sized>(
        &self,
        policy: &PolicyNetwork,
        rng: &mut R,
    ) -> Result<SampledProgram> {
        let stop = self.grammar.stop_action();
        let mut state = DecodeState::default();
        let mut prefix: Vec<usize> = Vec::new();
        let mut actions = Vec::new();
        let mut log_probs = Vec::new();
        let mut traces = Vec::new();
        let mut entropy = 0.0;
        let mut rejected = None;

        // at most max_seq_len tokens plus STOP
        for _ in 0..=self.grammar.max_seq_len() {
            let mask = self.grammar.mask(state);
            if !mask.iter().any(|&m| m) {
                rejected = Some(InvalidReason::Unclosed { depth: state.depth });
                break;
            }

            let mut trace = policy.forward(&prefix, state.depth, &mask)?;
            let action = policy.sample(&trace, rng)?;
            trace.action = Some(action);

            log_probs.push(trace.log_prob(action));
            entropy += trace.entropy();
            actions.push(action);
            traces.push(trace);

            if action == stop {
                break;
            }
            state = self.grammar.advance(state, action).ok_or_else(|| {
                AlphaMinerError::Internal(format!("action {} not applicable at depth {}", action, state.depth))
            })?;
            prefix.push(action);
        }

        if rejected.is_none() && actions.last() != Some(&stop) {
            rejected = Some(InvalidReason::Unclosed { depth: state.depth });
        }

        let tokens: Vec<Token> = prefix.iter().map(|&a| Token::new(a)).collect();
        let draw = match rejected {
            Some(reason) => Draw::Rejected(reason),
            None => match self.validator.validate_tokens(&tokens) {
                Validation::Valid(formula) => Draw::Valid {
                    program: Program::new(tokens),
                    formula,
                },
                Validation::Invalid(reason) => {
                    log::warn!("Grammar violation: masked decode produced {}", reason);
                    Draw::Rejected(reason)
                }
            },
        };

        Ok(SampledProgram {
            draw,
            actions,
            log_probs,
            entropy,
            traces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::policy::PolicyShape;
    use crate::functions::registry::OperatorRegistry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn generator(max_seq_len: usize) -> (FormulaGenerator, PolicyNetwork) {
        let registry = Arc::new(OperatorRegistry::new(true));
        let grammar = Grammar::new(&registry, max_seq_len);
        let validator = ProgramValidator::new(Arc::clone(&registry), max_seq_len);
        let shape = PolicyShape {
            vocab_size: registry.len(),
            max_seq_len,
            d_model: 16,
            nhead: 4,
            num_layers: 2,
        };
        let mut rng = StdRng::seed_from_u64(9);
        let policy = PolicyNetwork::new(shape, &mut rng).unwrap();
        (FormulaGenerator::new(grammar, validator), policy)
    }

    #[test]
    fn test_every_draw_is_stack_safe() {
        for max_len in [1, 4, 15] {
            let (generator, policy) = generator(max_len);
            let mut rng = StdRng::seed_from_u64(1);
            let samples = generator.generate(&policy, 64, &mut rng).unwrap();
            assert_eq!(samples.len(), 64);
            for sample in &samples {
                assert!(sample.is_valid(), "{:?}", sample.draw);
                assert_eq!(sample.actions.len(), sample.log_probs.len());
                assert_eq!(sample.traces().len(), sample.actions.len());
                assert!(sample.log_prob() <= 0.0);
                assert!(sample.log_probs.iter().all(|lp| lp.is_finite()));
                if let Draw::Valid { program, .. } = &sample.draw {
                    assert!(program.len() <= max_len);
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_batch() {
        let (generator, policy) = generator(10);
        let a = generator
            .generate(&policy, 8, &mut StdRng::seed_from_u64(4))
            .unwrap();
        let b = generator
            .generate(&policy, 8, &mut StdRng::seed_from_u64(4))
            .unwrap();
        let fa: Vec<_> = a.iter().map(|s| s.draw.clone()).collect();
        let fb: Vec<_> = b.iter().map(|s| s.draw.clone()).collect();
        assert_eq!(fa, fb);
    }
}
