use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use qr_core::{now_iso8601, CreateQueryMessage, Error, ReflectMessage, StageKind, StageMessage};

use super::{TerminationReason, Transition};
use crate::model::ResearchModel;
use crate::prompts::reflection_prompt;

/// Decides whether the chain loops back or ends.
///
/// A spent budget ends the chain without asking the model. Otherwise a
/// non-empty `follow_up_query` loops back; a missing, null or empty one
/// means reflection found no gap worth another round.
pub struct Reflect {
    model: Arc<ResearchModel>,
}

#[derive(Deserialize)]
struct ReflectionReply {
    #[serde(default)]
    knowledge_gap: Option<String>,
    #[serde(default)]
    follow_up_query: Option<String>,
}

impl Reflect {
    pub fn new(model: Arc<ResearchModel>) -> Self {
        Self { model }
    }

    pub async fn handle(&self, message: ReflectMessage) -> Result<Transition, Error> {
        let ReflectMessage { context, content } = message;

        if context.is_exhausted() {
            info!(topic = %context.root_topic(), "Iteration budget spent");
            return Ok(Transition::Terminate {
                context,
                reason: TerminationReason::BudgetExhausted,
            });
        }

        let reply: ReflectionReply = self
            .model
            .complete_json(
                StageKind::Reflect.as_str(),
                &reflection_prompt(context.topics()),
                &content,
            )
            .await?;

        let follow_up = reply
            .follow_up_query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        match follow_up {
            Some(follow_up) => {
                info!(
                    gap = reply.knowledge_gap.as_deref().unwrap_or_default(),
                    follow_up = %follow_up,
                    remaining = context.remaining_iterations() - 1,
                    "Knowledge gap found, looping back"
                );
                Ok(Transition::Next(StageMessage::CreateQuery(
                    CreateQueryMessage {
                        context: context.with_budget_spent(),
                        original_topic: follow_up,
                        date: now_iso8601(),
                    },
                )))
            }
            None => {
                info!(topic = %context.root_topic(), "No knowledge gap left");
                Ok(Transition::Terminate {
                    context,
                    reason: TerminationReason::NoKnowledgeGap,
                })
            }
        }
    }
}
