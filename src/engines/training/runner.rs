use super::progress::{CancellationToken, FactorSink};
use super::trainer::{TrainingRun, TrainingSummary};
use crate::error::{AlphaMinerError, Result};
use crate::types::{DiscoveredFactor, TrainingStepRecord};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};

/// Progress update from the training thread
#[derive(Debug, Clone)]
pub enum TrainingEvent {
    Step(TrainingStepRecord),
    Discovered(DiscoveredFactor),
    Finished(TrainingSummary),
    Failed(String),
}

/// Forwards new-best factors into the event channel
struct EventSink {
    events: Sender<TrainingEvent>,
}

impl FactorSink for EventSink {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        let _ = self.events.send(TrainingEvent::Discovered(factor.clone()));
    }
}

/// Result from a background run
pub type RunResult = std::result::Result<TrainingSummary, String>;

pub struct TrainingRunner {
    handle: Option<JoinHandle<RunResult>>,
    progress_rx: Receiver<TrainingEvent>,
    cancel: CancellationToken,
}

impl TrainingRunner {
    /// Start training in a background thread
    pub fn start(mut run: TrainingRun) -> Result<Self> {
        let (events_tx, progress_rx) = channel();
        let cancel = CancellationToken::new();
        let thread_cancel = cancel.clone();

        run.add_sink(Box::new(EventSink {
            events: events_tx.clone(),
        }));

        let handle = thread::Builder::new()
            .name("alphaminer-training".to_string())
            .spawn(move || Self::run_training(run, events_tx, thread_cancel))
            .map_err(AlphaMinerError::Io)?;

        Ok(Self {
            handle: Some(handle),
            progress_rx,
            cancel,
        })
    }

    fn run_training(
        mut run: TrainingRun,
        events: Sender<TrainingEvent>,
        cancel: CancellationToken,
    ) -> RunResult {
        log::info!("Training thread started ({} steps)", run.num_steps());

        let result = run.run(&cancel, |record| {
            let _ = events.send(TrainingEvent::Step(record.clone()));
        });

        match result {
            Ok(summary) => {
                let _ = events.send(TrainingEvent::Finished(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                let message = format!("Training failed: {}", e);
                let _ = events.send(TrainingEvent::Failed(message.clone()));
                Err(message)
            }
        }
    }

    /// Poll for progress updates (non-blocking)
    pub fn poll_progress(&mut self) -> Option<TrainingEvent> {
        self.progress_rx.try_recv().ok()
    }

    /// Drain every event currently queued
    pub fn drain_progress(&mut self) -> Vec<TrainingEvent> {
        self.progress_rx.try_iter().collect()
    }

    /// Check if training is complete and get results
    pub fn try_get_results(&mut self) -> Option<RunResult> {
        let handle = self.handle.take()?;
        if handle.is_finished() {
            Some(Self::join_handle(handle))
        } else {
            self.handle = Some(handle);
            None
        }
    }

    /// Block until the thread exits
    pub fn join(mut self) -> Option<RunResult> {
        self.handle.take().map(Self::join_handle)
    }

    fn join_handle(handle: JoinHandle<RunResult>) -> RunResult {
        handle
            .join()
            .unwrap_or_else(|_| Err("Training thread panicked".to_string()))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for TrainingRunner {
    fn drop(&mut self) {
        self.cancel();
    }
}
