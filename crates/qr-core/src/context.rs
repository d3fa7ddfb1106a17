//! The research ledger carried by every stage message.
//!
//! A chain's entire state lives here. Stages never edit a ledger in place:
//! each one consumes the ledger it received and hands back a new value with
//! one more entry, so a message in flight always describes a consistent
//! prefix of the chain's history.
//!
//! Layout: `topics[0]` is the topic the user asked about. Every research
//! round then appends the search query it generated to `topics` and,
//! once summarized, its summary to `summaries`. Round `i` is therefore
//! `(topics[i + 1], summaries[i])`.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchContext {
    topics: Vec<String>,
    summaries: Vec<String>,
    remaining_iterations: u32,
}

impl ResearchContext {
    /// Start a new chain for `topic` with `budget` loop-backs available.
    pub fn new(topic: impl Into<String>, budget: u32) -> Self {
        Self {
            topics: vec![topic.into()],
            summaries: Vec::new(),
            remaining_iterations: budget,
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn summaries(&self) -> &[String] {
        &self.summaries
    }

    pub fn remaining_iterations(&self) -> u32 {
        self.remaining_iterations
    }

    /// The topic the chain was started with. Used as report title and key.
    pub fn root_topic(&self) -> &str {
        self.topics.first().map(String::as_str).unwrap_or_default()
    }

    /// The topic the chain is currently working on.
    pub fn current_topic(&self) -> &str {
        self.topics.last().map(String::as_str).unwrap_or_default()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_iterations == 0
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summaries.push(summary.into());
        self
    }

    /// Spend one loop-back from the budget. Saturates at zero.
    pub fn with_budget_spent(mut self) -> Self {
        self.remaining_iterations = self.remaining_iterations.saturating_sub(1);
        self
    }

    /// Completed rounds as `(topic, summary)` pairs, oldest first.
    ///
    /// A summary without a matching round topic is labelled with the root
    /// topic rather than dropped.
    pub fn rounds(&self) -> impl Iterator<Item = (&str, &str)> {
        self.summaries.iter().enumerate().map(move |(i, summary)| {
            let topic = self
                .topics
                .get(i + 1)
                .map(String::as_str)
                .unwrap_or_else(|| self.root_topic());
            (topic, summary.as_str())
        })
    }

    /// Check the ledger invariants on a context decoded from the wire.
    pub fn validate(&self) -> Result<(), Error> {
        if self.topics.is_empty() {
            return Err(Error::invalid_request("research context has no topics"));
        }
        if self.root_topic().trim().is_empty() {
            return Err(Error::invalid_request("research context has an empty root topic"));
        }
        if self.summaries.len() > self.topics.len() {
            return Err(Error::invalid_request(format!(
                "research context has {} summaries but only {} topics",
                self.summaries.len(),
                self.topics.len()
            )));
        }
        Ok(())
    }
}
