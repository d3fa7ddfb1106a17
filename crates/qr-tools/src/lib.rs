//! qr-tools: External capabilities used by the research loop
//!
//! - Extract: clean fetched HTML and render it as markdown-like text
//! - Search: web search engines, a page fetcher, and the search adapter
//!   that combines them
//! - Storage: filesystem report store

pub mod extract;
pub mod search;
pub mod storage;

pub use extract::ContentExtractor;
pub use search::{
    http_client, DuckDuckGoSearch, PageFetcher, SearchEngine, SearchHit, SearxngSearch,
    WebSearchAdapter,
};
pub use storage::FsReportStore;
