//! qr-core: Core types and traits for quick-research
//!
//! This crate provides the foundational types shared by every stage of the
//! research loop: the chat/provider abstraction used to talk to the model,
//! the append-only research ledger, the stage message union that travels on
//! the bus, and the boundary traits for search, publishing and storage.

pub mod blocking;
pub mod channel;
pub mod context;
pub mod error;
pub mod message;
pub mod provider;
pub mod search;
pub mod stage;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use blocking::run_blocking;
pub use channel::Publisher;
pub use context::ResearchContext;
pub use error::Error;
pub use message::{strip_thinking_tags, Message, Role, Usage};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use search::{SearchAdapter, SearchResult};
pub use stage::{
    now_iso8601, CreateQueryMessage, QueryMessage, ReflectMessage, SearchDirective, StageKind,
    StageMessage, SummarizeMessage,
};
pub use storage::ReportStore;

pub type Result<T> = std::result::Result<T, Error>;
