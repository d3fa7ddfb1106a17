//! Event bus for research chain progress.
//!
//! The bus worker reports the outcome of every hop here so that `qr run`
//! can wait for its chain and `qr serve` can log completions.

use tokio::sync::broadcast;

use qr_core::StageKind;

/// Events emitted as chains make progress. `topic` is the chain's root topic.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    /// A stage finished and published the next message.
    StageCompleted {
        topic: String,
        stage: StageKind,
        next: StageKind,
    },
    /// The chain ended and its report was stored.
    ReportWritten {
        topic: String,
        location: String,
        reason: String,
    },
    /// A hop failed; the chain is dropped.
    Failed {
        topic: String,
        stage: StageKind,
        error: String,
    },
}

impl ChainEvent {
    pub fn topic(&self) -> &str {
        match self {
            ChainEvent::StageCompleted { topic, .. }
            | ChainEvent::ReportWritten { topic, .. }
            | ChainEvent::Failed { topic, .. } => topic,
        }
    }

    /// Whether this event ends its chain.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChainEvent::ReportWritten { .. } | ChainEvent::Failed { .. }
        )
    }
}

/// Clone this to share across tasks. Each clone shares the same
/// underlying broadcast channel.
#[derive(Clone)]
pub struct ChainEventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl ChainEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ChainEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.tx.send(event);
    }
}

/// Wait for the terminal event of the chain rooted at `topic`.
///
/// Returns `None` if the bus closes first.
pub async fn wait_for_chain(
    rx: &mut broadcast::Receiver<ChainEvent>,
    topic: &str,
) -> Option<ChainEvent> {
    loop {
        match rx.recv().await {
            Ok(event) if event.topic() == topic && event.is_terminal() => return Some(event),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Chain event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_chain_skips_other_topics() {
        let bus = ChainEventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(ChainEvent::ReportWritten {
            topic: "other".to_string(),
            location: "x".to_string(),
            reason: "no knowledge gap".to_string(),
        });
        bus.publish(ChainEvent::StageCompleted {
            topic: "mine".to_string(),
            stage: StageKind::CreateQuery,
            next: StageKind::Query,
        });
        bus.publish(ChainEvent::Failed {
            topic: "mine".to_string(),
            stage: StageKind::Query,
            error: "no usable content".to_string(),
        });

        let event = wait_for_chain(&mut rx, "mine").await.unwrap();
        assert!(matches!(event, ChainEvent::Failed { stage: StageKind::Query, .. }));
    }

    #[tokio::test]
    async fn test_wait_for_chain_returns_none_when_closed() {
        let bus = ChainEventBus::new(4);
        let mut rx = bus.subscribe();
        drop(bus);

        assert!(wait_for_chain(&mut rx, "topic").await.is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = ChainEventBus::new(4);
        bus.publish(ChainEvent::Failed {
            topic: "t".to_string(),
            stage: StageKind::Reflect,
            error: "e".to_string(),
        });
    }
}
