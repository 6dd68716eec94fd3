use alphaminer::config::{AppConfig, FeatureConfig};
use alphaminer::data::SyntheticMarket;
use alphaminer::engines::generation::policy::policy_gradient_logits;
use alphaminer::engines::generation::{
    Adam, FormulaGenerator, Grammar, PolicyNetwork, PolicyShape, ProgramValidator,
};
use alphaminer::engines::training::{CancellationToken, TrainerState, TrainingEvent};
use alphaminer::functions::OperatorRegistry;
use alphaminer::types::{DiscoveredFactor, TrainingStepRecord};
use alphaminer::{AlphaMiner, TrainOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

fn scenario_miner() -> AlphaMiner {
    let features = SyntheticMarket::new(50, 6, 252, 42).generate().unwrap();
    let config = AppConfig {
        features: FeatureConfig {
            enable_sentiment: true,
        },
        ..AppConfig::default()
    };
    AlphaMiner::new(config, features).unwrap()
}

fn assert_best_monotone(records: &[TrainingStepRecord]) {
    let mut previous: Option<f64> = None;
    for record in records {
        match (previous, record.best_score) {
            (Some(_), None) => panic!("best score disappeared at step {}", record.step),
            (Some(prev), Some(now)) => assert!(now >= prev, "best dropped at step {}", record.step),
            _ => {}
        }
        previous = record.best_score;
    }
}

#[test]
fn test_short_training_run_finds_a_formula() {
    let miner = scenario_miner();
    let mut run = miner.train(TrainOptions::new(10, 16).with_seed(7)).unwrap();
    let found = Arc::new(Mutex::new(Vec::new()));
    run.add_sink(Box::new(SharedSink(Arc::clone(&found))));

    let mut streamed = Vec::new();
    let summary = run
        .run(&CancellationToken::new(), |record| streamed.push(record.clone()))
        .unwrap();

    assert_eq!(summary.state, TrainerState::Completed);
    assert_eq!(summary.total_steps, 10);
    assert_eq!(streamed.len(), 10);
    assert_eq!(run.records(), streamed.as_slice());
    assert!(run.replay().map(|r| r.step).eq(0..10));

    for record in &streamed {
        assert!(record.valid_ratio > 0.0 && record.valid_ratio <= 1.0);
        assert!(record.loss.is_finite());
        assert!(record.max_reward >= record.avg_reward);
    }
    assert_best_monotone(&streamed);

    let best = summary.best_formula.clone().unwrap();
    assert!(!best.is_empty());
    assert!(miner.parse(&best).is_ok());
    assert_eq!(summary.best_score, streamed.last().unwrap().best_score);

    // one emission per improvement, the last being the final best
    let found = found.lock().unwrap();
    assert!(!found.is_empty());
    assert_eq!(found.last().unwrap().formula, best);

    let hof = &summary.hall_of_fame;
    assert!(!hof.is_empty());
    assert!(hof.windows(2).all(|w| w[0].reward >= w[1].reward));
    assert_eq!(hof[0].reward, summary.best_score.unwrap());
}

#[test]
fn test_cancellation_keeps_partial_results() {
    let miner = scenario_miner();
    let mut run = miner.train(TrainOptions::new(10, 8).with_seed(3)).unwrap();
    let cancel = CancellationToken::new();

    let mut seen = 0;
    for record in run.steps(&cancel) {
        record.unwrap();
        seen += 1;
        if seen == 3 {
            cancel.cancel();
        }
    }

    assert_eq!(seen, 3);
    assert_eq!(run.state(), &TrainerState::Aborted);
    let summary = run.summary();
    assert_eq!(summary.total_steps, 3);
    assert_eq!(summary.state, TrainerState::Aborted);
    assert_eq!(run.records().len(), 3);
    assert!(run.step().is_err());
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let miner = scenario_miner();
    let options = TrainOptions::new(3, 8).with_seed(99);

    let mut first = miner.train(options.clone()).unwrap();
    first.run(&CancellationToken::new(), |_| {}).unwrap();
    let mut second = miner.train(options).unwrap();
    second.run(&CancellationToken::new(), |_| {}).unwrap();

    assert_eq!(first.records(), second.records());
}

#[test]
fn test_background_runner_reports_events() {
    let miner = scenario_miner();
    let runner = miner
        .spawn_training(TrainOptions::new(4, 8).with_seed(1))
        .unwrap();
    let cancel = runner.cancel_token();
    assert!(!cancel.is_cancelled());

    let mut runner = runner;
    let mut events = Vec::new();
    let result = loop {
        events.extend(runner.drain_progress());
        if let Some(result) = runner.try_get_results() {
            break result;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    };
    events.extend(runner.drain_progress());

    let summary = result.unwrap();
    assert_eq!(summary.total_steps, 4);
    let steps = events
        .iter()
        .filter(|e| matches!(e, TrainingEvent::Step(_)))
        .count();
    assert_eq!(steps, 4);
    assert!(matches!(events.last(), Some(TrainingEvent::Finished(_))));
}

#[test]
fn test_policy_gradient_step_raises_rewarded_sequence() {
    let registry = Arc::new(OperatorRegistry::default());
    let max_seq_len = 8;
    let grammar = Grammar::new(&registry, max_seq_len);
    let generator = FormulaGenerator::new(
        grammar.clone(),
        ProgramValidator::new(Arc::clone(&registry), max_seq_len),
    );
    let mut rng = StdRng::seed_from_u64(21);
    let shape = PolicyShape {
        vocab_size: registry.len(),
        max_seq_len,
        d_model: 16,
        nhead: 2,
        num_layers: 2,
    };
    let mut policy = PolicyNetwork::new(shape, &mut rng).unwrap();
    let mut optimizer = Adam::new(1e-4, policy.params());

    let sample = generator.generate(&policy, 1, &mut rng).unwrap().remove(0);
    let before = policy.sequence_log_prob(&sample.actions, &grammar).unwrap();
    assert!((before - sample.log_prob()).abs() < 1e-9);

    let mut grads = policy.zero_grads();
    for (trace, &action) in sample.traces().iter().zip(&sample.actions) {
        let dlogits = policy_gradient_logits(trace, action, 1.0, 0.0);
        policy.accumulate_gradients(trace, &dlogits, &mut grads);
    }
    optimizer.step(policy.params_mut(), &grads);

    let after = policy.sequence_log_prob(&sample.actions, &grammar).unwrap();
    assert!(after > before, "log-prob {} -> {}", before, after);
}

struct SharedSink(Arc<Mutex<Vec<DiscoveredFactor>>>);

impl alphaminer::engines::training::FactorSink for SharedSink {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        self.0.lock().unwrap().push(factor.clone());
    }
}
