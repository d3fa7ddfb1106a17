//! The four stage handlers of the research loop.
//!
//! Each handler consumes one [`StageMessage`] variant and returns what should
//! happen next. None of them publishes anything: the router owns the bus.

mod create_query;
mod reflect;
mod run_query;
mod summarize;

pub use create_query::CreateQuery;
pub use reflect::Reflect;
pub use run_query::RunQuery;
pub use summarize::Summarize;

use qr_core::{ResearchContext, StageMessage};

/// The outcome of a hop.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Publish this message to continue the chain.
    Next(StageMessage),
    /// The chain is finished; assemble the report from `context`.
    Terminate {
        context: ResearchContext,
        reason: TerminationReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The iteration budget ran out.
    BudgetExhausted,
    /// Reflection found nothing left to research.
    NoKnowledgeGap,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::BudgetExhausted => write!(f, "budget exhausted"),
            TerminationReason::NoKnowledgeGap => write!(f, "no knowledge gap"),
        }
    }
}
