use std::sync::Arc;

use tracing::{debug, info};

use qr_core::{
    run_blocking, Error, QueryMessage, SearchAdapter, SearchResult, StageMessage, SummarizeMessage,
};
use qr_tools::ContentExtractor;

/// Runs the search and turns the fetched pages into one text document.
pub struct RunQuery {
    search: Arc<dyn SearchAdapter>,
    extractor: ContentExtractor,
    results_per_query: usize,
}

impl RunQuery {
    pub fn new(search: Arc<dyn SearchAdapter>, extractor: ContentExtractor) -> Self {
        Self {
            search,
            extractor,
            results_per_query: 3,
        }
    }

    pub fn with_results_per_query(mut self, results_per_query: usize) -> Self {
        self.results_per_query = results_per_query.max(1);
        self
    }

    pub async fn handle(&self, message: QueryMessage) -> Result<StageMessage, Error> {
        let QueryMessage { context, query } = message;

        let results = self
            .search
            .search(&query.query, self.results_per_query)
            .await?;
        let fetched = results.len();

        let extractor = self.extractor;
        let sources = run_blocking(move || extract_sources(extractor, results)).await?;

        if sources.is_empty() {
            return Err(Error::NoUsableContent(format!(
                "no readable sources for query '{}' ({} fetched)",
                query.query, fetched
            )));
        }

        let content = sources.join("\n\n");
        info!(query = %query.query, sources = sources.len(), "Collected search content");
        debug!(chars = content.len(), "Summarize payload size");

        Ok(StageMessage::Summarize(SummarizeMessage { context, content }))
    }
}

/// Render each page as `# <title>` followed by its text. Pages with no
/// readable text are skipped.
fn extract_sources(extractor: ContentExtractor, results: Vec<SearchResult>) -> Vec<String> {
    results
        .into_iter()
        .filter_map(|result| {
            let text = extractor.extract(&result.html);
            if text.is_empty() {
                debug!(url = %result.url, "No readable content");
                return None;
            }
            let title = if result.title.trim().is_empty() {
                result.url
            } else {
                result.title
            };
            Some(format!("# {}\n\n{}", title.trim(), text))
        })
        .collect()
}
