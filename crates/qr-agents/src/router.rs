//! Dispatches stage messages to their handlers and publishes the result.
//!
//! The message `type` is the loop's program counter: the router handles one
//! hop per call and never loops itself. Looping happens because the next
//! message goes back onto the bus.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use qr_core::{Error, Publisher, StageKind, StageMessage};

use crate::dedup::{message_digest, DedupWindow};
use crate::model::ResearchModel;
use crate::report::ReportAssembler;
use crate::stages::{CreateQuery, Reflect, RunQuery, Summarize, TerminationReason, Transition};

/// What a single hop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopOutcome {
    /// The next message, of this kind, was published.
    Published(StageKind),
    /// The chain ended and its report was stored.
    ReportWritten {
        key: String,
        location: String,
        reason: TerminationReason,
    },
    /// The message was seen recently and was dropped.
    Duplicate,
}

pub struct Router {
    create_query: CreateQuery,
    run_query: RunQuery,
    summarize: Summarize,
    reflect: Reflect,
    assembler: ReportAssembler,
    publisher: Arc<dyn Publisher>,
    dedup: DedupWindow,
}

impl Router {
    pub fn new(
        model: Arc<ResearchModel>,
        run_query: RunQuery,
        assembler: ReportAssembler,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            create_query: CreateQuery::new(model.clone()),
            run_query,
            summarize: Summarize::new(model.clone()),
            reflect: Reflect::new(model),
            assembler,
            publisher,
            dedup: DedupWindow::new(1024),
        }
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup = DedupWindow::new(capacity);
        self
    }

    /// Handle one delivered message.
    ///
    /// On error nothing has been published for this message and its claim in
    /// the dedup window is released.
    pub async fn handle(&self, message: StageMessage) -> Result<HopOutcome, Error> {
        message.context().validate()?;

        let kind = message.kind();
        let topic = message.context().root_topic().to_string();
        let digest = message_digest(&message)?;

        if !self.dedup.begin(&digest) {
            warn!(stage = %kind, topic = %topic, "Dropping duplicate delivery");
            return Ok(HopOutcome::Duplicate);
        }

        debug!(stage = %kind, topic = %topic, remaining = message.context().remaining_iterations(), "Handling message");
        match self.dispatch(message).await {
            Ok(outcome) => {
                self.dedup.complete(&digest);
                Ok(outcome)
            }
            Err(e) => {
                self.dedup.abandon(&digest);
                error!(stage = %kind, topic = %topic, error = %e, "Hop failed");
                Err(e)
            }
        }
    }

    async fn dispatch(&self, message: StageMessage) -> Result<HopOutcome, Error> {
        let transition = match message {
            StageMessage::CreateQuery(m) => Transition::Next(self.create_query.handle(m).await?),
            StageMessage::Query(m) => Transition::Next(self.run_query.handle(m).await?),
            StageMessage::Summarize(m) => Transition::Next(self.summarize.handle(m).await?),
            StageMessage::Reflect(m) => self.reflect.handle(m).await?,
        };

        match transition {
            Transition::Next(next) => {
                let kind = next.kind();
                self.publisher.publish(next).await?;
                info!(next = %kind, "Published next stage");
                Ok(HopOutcome::Published(kind))
            }
            Transition::Terminate { context, reason } => {
                let (key, location) = self.assembler.assemble(&context).await?;
                info!(topic = %key, reason = %reason, "Research chain finished");
                Ok(HopOutcome::ReportWritten {
                    key,
                    location,
                    reason,
                })
            }
        }
    }
}
