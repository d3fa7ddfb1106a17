//! Web search and page fetching.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use qr_core::{Error, SearchAdapter, SearchResult};

const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// Build the HTTP client shared by search engines and the page fetcher.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<Client, Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))
}

/// One search hit before its page has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
}

#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `limit` hits for `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error>;
}

// =============================================================================
// DuckDuckGo (HTML endpoint)
// =============================================================================

pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchEngine for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
        // kp=1 is DuckDuckGo's strict safe-search setting
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query), ("kp", "1")])
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|e| Error::search(format!("DuckDuckGo request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::search(format!(
                "DuckDuckGo search error: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::search(format!("Failed to read DuckDuckGo response: {}", e)))?;

        Ok(parse_duckduckgo_results(&body, limit))
    }
}

/// Parse the result list of DuckDuckGo's HTML endpoint. Ads are skipped.
pub fn parse_duckduckgo_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let (Ok(result_sel), Ok(link_sel)) = (Selector::parse(".result"), Selector::parse("a.result__a"))
    else {
        return Vec::new();
    };

    let mut hits: Vec<SearchHit> = Vec::new();
    for result in document.select(&result_sel) {
        if hits.len() >= limit {
            break;
        }
        let is_ad = result
            .value()
            .attr("class")
            .is_some_and(|c| c.contains("result--ad"));
        if is_ad {
            continue;
        }
        let Some(link) = result.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(unwrap_redirect) else {
            continue;
        };
        if hits.iter().any(|h| h.url == url) {
            continue;
        }
        let title = link.text().collect::<Vec<_>>().join(" ");
        hits.push(SearchHit {
            url,
            title: title.split_whitespace().collect::<Vec<_>>().join(" "),
        });
    }
    hits
}

/// Resolve a result link to the target page, unwrapping DuckDuckGo's
/// `/l/?uddg=` redirect. Only http(s) targets are returned.
fn unwrap_redirect(href: &str) -> Option<String> {
    let base = Url::parse("https://duckduckgo.com/").ok()?;
    let link = base.join(href).ok()?;

    let target = if link.path() == "/l/" {
        let uddg = link
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        Url::parse(&uddg).ok()?
    } else {
        link
    };

    matches!(target.scheme(), "http" | "https").then(|| target.to_string())
}

// =============================================================================
// SearXNG (JSON API)
// =============================================================================

pub struct SearxngSearch {
    client: Client,
    base_url: String,
}

impl SearxngSearch {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
}

#[async_trait]
impl SearchEngine for SearxngSearch {
    fn name(&self) -> &str {
        "searxng"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json"), ("safesearch", "2")])
            .send()
            .await
            .map_err(|e| Error::search(format!("SearXNG request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::search(format!(
                "SearXNG search error: {}",
                response.status()
            )));
        }

        let parsed: SearxngResponse = response
            .json()
            .await
            .map_err(|e| Error::search(format!("Failed to parse SearXNG response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let url = r.url?;
                Some(SearchHit {
                    title: r.title.unwrap_or_else(|| url.clone()),
                    url,
                })
            })
            .take(limit)
            .collect())
    }
}

// =============================================================================
// Page fetcher and search adapter
// =============================================================================

pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, Error> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| Error::network(format!("Failed to fetch '{}': {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::api(
                response.status().as_u16(),
                format!("HTTP error fetching {}", url),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| Error::network(format!("Failed to read '{}': {}", url, e)))
    }
}

/// Runs a search and fetches every hit concurrently.
pub struct WebSearchAdapter {
    engine: Arc<dyn SearchEngine>,
    fetcher: PageFetcher,
}

impl WebSearchAdapter {
    pub fn new(engine: Arc<dyn SearchEngine>, fetcher: PageFetcher) -> Self {
        Self { engine, fetcher }
    }
}

#[async_trait]
impl SearchAdapter for WebSearchAdapter {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, Error> {
        let hits = self.engine.search(query, limit).await?;
        debug!(engine = self.engine.name(), hits = hits.len(), "Search returned");

        let fetches = hits.iter().map(|hit| self.fetcher.fetch(&hit.url));
        let pages = join_all(fetches).await;

        let total = hits.len();
        let results: Vec<SearchResult> = hits
            .into_iter()
            .zip(pages)
            .filter_map(|(hit, page)| match page {
                Ok(html) => Some(SearchResult {
                    url: hit.url,
                    title: hit.title,
                    html,
                }),
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "Dropping search result");
                    None
                }
            })
            .collect();

        info!(query, fetched = results.len(), total, "Fetched search results");
        Ok(results)
    }
}
