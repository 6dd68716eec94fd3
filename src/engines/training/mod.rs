pub mod hall_of_fame;
pub mod progress;
pub mod runner;
pub mod trainer;

pub use hall_of_fame::HallOfFame;
pub use progress::{CancellationToken, ChannelSink, FactorSink, LogSink};
pub use runner::{RunResult, TrainingEvent, TrainingRunner};
pub use trainer::{Steps, TrainerState, TrainingRun, TrainingSummary};
