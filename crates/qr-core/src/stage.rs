//! Stage messages: the wire format of the research loop.
//!
//! The `type` field is the loop's program counter. Every variant flattens
//! the [`ResearchContext`] next to its stage-specific fields, so a message
//! serializes as e.g.
//!
//! ```json
//! {"type":"query","topics":["rust"],"summaries":[],"remainingIterations":3,
//!  "query":{"query":"rust ownership","rationale":"..."}}
//! ```

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ResearchContext;

/// Current UTC time as an RFC 3339 / ISO-8601 string.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageMessage {
    CreateQuery(CreateQueryMessage),
    Query(QueryMessage),
    Summarize(SummarizeMessage),
    Reflect(ReflectMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryMessage {
    #[serde(flatten)]
    pub context: ResearchContext,
    pub original_topic: String,
    pub date: String,
}

/// A search query and the model's reason for running it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDirective {
    pub query: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    #[serde(flatten)]
    pub context: ResearchContext,
    pub query: SearchDirective,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeMessage {
    #[serde(flatten)]
    pub context: ResearchContext,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectMessage {
    #[serde(flatten)]
    pub context: ResearchContext,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    CreateQuery,
    Query,
    Summarize,
    Reflect,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::CreateQuery => "create_query",
            StageKind::Query => "query",
            StageKind::Summarize => "summarize",
            StageKind::Reflect => "reflect",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StageMessage {
    /// The message that starts a new chain for `topic`.
    pub fn seed(topic: impl Into<String>, budget: u32, date: impl Into<String>) -> Self {
        let topic = topic.into();
        StageMessage::CreateQuery(CreateQueryMessage {
            context: ResearchContext::new(topic.clone(), budget),
            original_topic: topic,
            date: date.into(),
        })
    }

    pub fn kind(&self) -> StageKind {
        match self {
            StageMessage::CreateQuery(_) => StageKind::CreateQuery,
            StageMessage::Query(_) => StageKind::Query,
            StageMessage::Summarize(_) => StageKind::Summarize,
            StageMessage::Reflect(_) => StageKind::Reflect,
        }
    }

    pub fn context(&self) -> &ResearchContext {
        match self {
            StageMessage::CreateQuery(m) => &m.context,
            StageMessage::Query(m) => &m.context,
            StageMessage::Summarize(m) => &m.context,
            StageMessage::Reflect(m) => &m.context,
        }
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(payload)?)
    }
}
