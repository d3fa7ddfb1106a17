use std::sync::Arc;

use tracing::{debug, info};

use qr_core::{Error, ReflectMessage, StageKind, StageMessage, SummarizeMessage};

use crate::model::ResearchModel;
use crate::prompts::summarizer_prompt;

/// Condenses the collected content into one summary for the current topic.
pub struct Summarize {
    model: Arc<ResearchModel>,
}

impl Summarize {
    pub fn new(model: Arc<ResearchModel>) -> Self {
        Self { model }
    }

    pub async fn handle(&self, message: SummarizeMessage) -> Result<StageMessage, Error> {
        let SummarizeMessage { context, content } = message;
        let topic = context.current_topic().to_string();

        debug!(topic = %topic, chars = content.len(), previous = context.summaries().len(), "Summarizing");
        let summary = self
            .model
            .complete_text(&summarizer_prompt(&topic), &content)
            .await?;

        if summary.is_empty() {
            return Err(Error::malformed(
                StageKind::Summarize.as_str(),
                "model returned an empty summary",
            ));
        }
        info!(topic = %topic, chars = summary.len(), "Summary written");

        Ok(StageMessage::Reflect(ReflectMessage {
            context: context.with_summary(summary.clone()),
            content: summary,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qr_core::testing::MockProvider;
    use qr_core::ResearchContext;
    use std::time::Duration;

    fn stage(provider: &Arc<MockProvider>) -> Summarize {
        Summarize::new(Arc::new(
            ResearchModel::new(provider.clone()).with_backoff(Duration::ZERO),
        ))
    }

    fn message() -> SummarizeMessage {
        SummarizeMessage {
            context: ResearchContext::new("quantum error correction", 3)
                .with_topic("surface code threshold"),
            content: "# Surface codes\n\nThresholds near one percent.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_appends_summary_only() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("  Surface codes tolerate about 1% physical error.  ");

        let next = stage(&provider).handle(message()).await.unwrap();
        let StageMessage::Reflect(m) = next else {
            panic!("expected a reflect message");
        };
        assert_eq!(m.content, "Surface codes tolerate about 1% physical error.");
        assert_eq!(m.context.topics().len(), 2);
        assert_eq!(
            m.context.summaries(),
            ["Surface codes tolerate about 1% physical error.".to_string()]
        );
        assert!(m.context.summaries().len() <= m.context.topics().len());

        let request = provider.last_request().unwrap();
        assert!(request.messages[0].content.contains("surface code threshold"));
        assert!(request.messages[1].content.starts_with("# Surface codes"));
    }

    #[tokio::test]
    async fn test_empty_summary_fails() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("   ");

        let err = stage(&provider).handle(message()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { .. }));
    }
}
