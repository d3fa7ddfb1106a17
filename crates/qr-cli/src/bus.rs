//! In-process message channel for stage messages.
//!
//! Messages travel as JSON strings, as they would over an external pub/sub
//! topic, so every hop goes through the same decode and validation path.
//! The worker handles each delivery on its own task; a chain's stages stay
//! sequential because each hop only publishes its successor when it is done.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use qr_agents::{HopOutcome, Router};
use qr_core::{Error, Publisher, StageMessage};

use crate::event_bus::{ChainEvent, ChainEventBus};

/// The publishing half of the channel.
#[derive(Clone)]
pub struct ChannelBus {
    tx: mpsc::Sender<String>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Publisher for ChannelBus {
    async fn publish(&self, message: StageMessage) -> Result<(), Error> {
        let payload = message.to_json()?;
        self.tx
            .send(payload)
            .await
            .map_err(|_| Error::bus("message channel is closed"))
    }
}

/// Subscriber that feeds every delivered message to the router.
pub struct BusWorker {
    rx: mpsc::Receiver<String>,
    router: Arc<Router>,
    events: ChainEventBus,
}

impl BusWorker {
    pub fn new(rx: mpsc::Receiver<String>, router: Arc<Router>, events: ChainEventBus) -> Self {
        Self { rx, router, events }
    }

    /// Run until every sender has been dropped.
    pub async fn run(mut self) {
        while let Some(payload) = self.rx.recv().await {
            let message = match StageMessage::from_json(&payload) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, bytes = payload.len(), "Dropping undecodable message");
                    continue;
                }
            };

            let router = self.router.clone();
            let events = self.events.clone();
            tokio::spawn(async move {
                deliver(&router, &events, message).await;
            });
        }
        info!("Message channel closed, worker stopping");
    }
}

async fn deliver(router: &Router, events: &ChainEventBus, message: StageMessage) {
    let stage = message.kind();
    let topic = message.context().root_topic().to_string();

    match router.handle(message).await {
        Ok(HopOutcome::Published(next)) => {
            events.publish(ChainEvent::StageCompleted { topic, stage, next });
        }
        Ok(HopOutcome::ReportWritten {
            location, reason, ..
        }) => {
            events.publish(ChainEvent::ReportWritten {
                topic,
                location,
                reason: reason.to_string(),
            });
        }
        Ok(HopOutcome::Duplicate) => {
            warn!(stage = %stage, topic = %topic, "Duplicate delivery ignored");
        }
        Err(e) => {
            events.publish(ChainEvent::Failed {
                topic,
                stage,
                error: e.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::wait_for_chain;
    use qr_agents::{ReportAssembler, ResearchModel, RunQuery};
    use qr_core::testing::{page, MemoryReportStore, MockProvider, MockSearch};
    use qr_core::StageKind;
    use qr_tools::ContentExtractor;
    use std::time::Duration;

    struct Pipeline {
        provider: Arc<MockProvider>,
        search: Arc<MockSearch>,
        store: Arc<MemoryReportStore>,
        bus: ChannelBus,
        events: ChainEventBus,
    }

    fn pipeline() -> Pipeline {
        let provider = Arc::new(MockProvider::new());
        let search = Arc::new(MockSearch::new());
        let store = Arc::new(MemoryReportStore::new());
        let events = ChainEventBus::new(64);
        let (bus, rx) = ChannelBus::new(16);

        let model = Arc::new(ResearchModel::new(provider.clone()).with_backoff(Duration::ZERO));
        let router = Arc::new(Router::new(
            model,
            RunQuery::new(search.clone(), ContentExtractor::new()),
            ReportAssembler::new(store.clone()),
            Arc::new(bus.clone()),
        ));
        tokio::spawn(BusWorker::new(rx, router, events.clone()).run());

        Pipeline {
            provider,
            search,
            store,
            bus,
            events,
        }
    }

    #[tokio::test]
    async fn test_chain_runs_to_report_over_the_channel() {
        let p = pipeline();
        p.provider
            .queue_response(r#"{"query": "surface codes", "rationale": "r"}"#);
        p.search
            .queue_pages(vec![page("https://a.example", "A", "alpha")]);
        p.provider.queue_response("Surface codes summary.");
        p.provider
            .queue_response(r#"{"knowledge_gap": "", "follow_up_query": ""}"#);

        let mut rx = p.events.subscribe();
        p.bus
            .publish(StageMessage::seed("quantum error correction", 3, "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let event = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_chain(&mut rx, "quantum error correction"),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(event, ChainEvent::ReportWritten { .. }));

        let report = p.store.get("quantum error correction").unwrap();
        assert!(report.contains("### Research Topic: surface codes\n\nSurface codes summary."));
    }

    #[tokio::test]
    async fn test_failed_hop_emits_failed_event() {
        let p = pipeline();
        p.provider
            .queue_response(r#"{"query": "surface codes", "rationale": "r"}"#);
        p.search.queue_pages(Vec::new());

        let mut rx = p.events.subscribe();
        p.bus
            .publish(StageMessage::seed("quantum error correction", 3, "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let event = tokio::time::timeout(
            Duration::from_secs(5),
            wait_for_chain(&mut rx, "quantum error correction"),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(
            event,
            ChainEvent::Failed {
                stage: StageKind::Query,
                ..
            }
        ));
        assert_eq!(p.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dropped() {
        let p = pipeline();
        p.provider
            .queue_response(r#"{"query": "q", "rationale": "r"}"#);
        p.search.queue_pages(Vec::new());

        let mut rx = p.events.subscribe();
        p.bus.tx.send("{\"type\":\"teleport\"}".to_string()).await.unwrap();
        p.bus
            .publish(StageMessage::seed("still works", 1, "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), wait_for_chain(&mut rx, "still works"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.topic(), "still works");
    }
}
