use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A fetched search hit. Lives only for the duration of one query stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub html: String,
}

/// Search the web and fetch the pages behind the top results.
#[async_trait]
pub trait SearchAdapter: Send + Sync {
    /// Return up to `limit` fetched pages for `query`.
    ///
    /// Pages that could not be fetched are left out of the result; only a
    /// failure of the search itself is an error.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, Error>;
}
