use crate::types::DiscoveredFactor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Cooperative stop signal, checked at every step boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives every factor that becomes the run's new best.
pub trait FactorSink: Send {
    fn on_factor(&mut self, factor: &DiscoveredFactor);
}

pub struct LogSink;

impl FactorSink for LogSink {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        log::info!(
            "Discovered factor at step {}: {} (reward {:.4})",
            factor.step,
            factor.formula,
            factor.reward
        );
    }
}

impl FactorSink for Vec<DiscoveredFactor> {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        self.push(factor.clone());
    }
}

// For handing factors to another thread
pub struct ChannelSink {
    sender: Sender<DiscoveredFactor>,
}

impl ChannelSink {
    pub fn new(sender: Sender<DiscoveredFactor>) -> Self {
        Self { sender }
    }
}

impl FactorSink for ChannelSink {
    fn on_factor(&mut self, factor: &DiscoveredFactor) {
        // a dropped receiver only means nobody is listening any more
        let _ = self.sender.send(factor.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metrics;
    use chrono::Utc;
    use std::sync::mpsc::channel;

    fn factor() -> DiscoveredFactor {
        DiscoveredFactor {
            formula: "RET".to_string(),
            reward: 1.0,
            metrics: Metrics::default(),
            step: 3,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (tx, rx) = channel();
        let mut sink = ChannelSink::new(tx);
        sink.on_factor(&factor());
        assert_eq!(rx.try_recv().unwrap().step, 3);

        drop(rx);
        sink.on_factor(&factor());
    }
}
