//! The research loop for quick-research.
//!
//! This crate provides:
//! - `ResearchModel`, the model client with retry and JSON re-prompt policies
//! - The four stage handlers (CreateQuery, RunQuery, Summarize, Reflect)
//! - `ReportAssembler` for the final document
//! - `Router`, which dispatches one message per call and publishes the next

mod dedup;
pub mod model;
pub mod prompts;
pub mod report;
pub mod router;
pub mod stages;

pub use dedup::{message_digest, DedupWindow};
pub use model::{strip_code_blocks, ResearchModel};
pub use report::{render_report, ReportAssembler};
pub use router::{HopOutcome, Router};
pub use stages::{CreateQuery, Reflect, RunQuery, Summarize, TerminationReason, Transition};
