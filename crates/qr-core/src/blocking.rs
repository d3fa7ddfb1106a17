//! Offloading CPU-bound work from the async runtime.
//!
//! HTML parsing in the extractor is the main user: `scraper::Html` is not
//! `Send`, so the whole parse-clean-render pass has to happen inside one
//! closure on Tokio's blocking pool.

use crate::Error;

/// Execute a CPU-intensive closure on Tokio's blocking threadpool.
pub async fn run_blocking<F, T>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Unknown(format!("Blocking task failed: {}", e)))
}
