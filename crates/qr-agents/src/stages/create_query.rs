use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use qr_core::{CreateQueryMessage, Error, QueryMessage, SearchDirective, StageKind, StageMessage};

use crate::model::ResearchModel;
use crate::prompts::query_prompt;

/// Turns a topic into a search query.
pub struct CreateQuery {
    model: Arc<ResearchModel>,
}

#[derive(Deserialize)]
struct QueryReply {
    query: String,
    #[serde(default)]
    rationale: String,
}

impl CreateQuery {
    pub fn new(model: Arc<ResearchModel>) -> Self {
        Self { model }
    }

    pub async fn handle(&self, message: CreateQueryMessage) -> Result<StageMessage, Error> {
        let CreateQueryMessage {
            context,
            original_topic,
            date,
        } = message;

        let system = query_prompt(&date, &original_topic);
        let reply: QueryReply = self
            .model
            .complete_json(StageKind::CreateQuery.as_str(), &system, &original_topic)
            .await?;

        let query = reply.query.trim().to_string();
        if query.is_empty() {
            return Err(Error::malformed(
                StageKind::CreateQuery.as_str(),
                "model returned an empty query",
            ));
        }

        info!(topic = %original_topic, query = %query, rationale = %reply.rationale, "Generated search query");

        Ok(StageMessage::Query(QueryMessage {
            context: context.with_topic(query.clone()),
            query: SearchDirective {
                query,
                rationale: reply.rationale,
            },
        }))
    }
}
