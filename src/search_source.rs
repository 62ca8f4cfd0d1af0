use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::error::SearchSourceError;

/// Hard ceiling on candidates per search, independent of what the caller asks
/// for.
pub const MAX_RESULTS: usize = 10;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One page returned by the backing search API, before scraping.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub title: String,
    pub url: String,
    pub domain: String,
    pub snippet: String,
}

#[derive(Serialize)]
struct SearchApiQuery<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Issues keyword queries against the search API and returns candidates in the
/// API's relevance order. Read-only; no re-ranking.
pub struct WebSearchSource {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl WebSearchSource {
    pub fn new() -> Result<WebSearchSource, SearchSourceError> {
        Self::with_endpoint(CONFIG.search_api_url.clone(), CONFIG.search_api_key.clone())
    }

    pub fn with_endpoint(
        api_url: String,
        api_key: Option<String>,
    ) -> Result<WebSearchSource, SearchSourceError> {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()?;
        Ok(WebSearchSource {
            client,
            api_url,
            api_key,
        })
    }

    /// Fetch up to `limit` candidates for `query`. With no API key configured
    /// this returns the built-in sample set so the service runs offline.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchCandidate>, SearchSourceError> {
        let limit = limit.min(MAX_RESULTS);

        let Some(api_key) = &self.api_key else {
            warn!("SEARCH_API_KEY not configured, returning sample results");
            return Ok(sample_candidates(query, limit));
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("X-API-KEY", api_key)
            .json(&SearchApiQuery { q: query, num: limit })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchSourceError::Status(status.as_u16()));
        }

        let body: SearchApiResponse = response
            .json()
            .await
            .map_err(|e| SearchSourceError::Decode(e.to_string()))?;

        let candidates: Vec<SearchCandidate> = body
            .organic
            .into_iter()
            .filter_map(|r| {
                let domain = domain_of(&r.link)?;
                Some(SearchCandidate {
                    title: r.title,
                    url: r.link,
                    domain,
                    snippet: r.snippet,
                })
            })
            .take(limit)
            .collect();

        info!("search API returned {} candidates for {:?}", candidates.len(), query);
        Ok(candidates)
    }
}

/// Host portion of a candidate URL; `None` drops unparseable candidates.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.trim_start_matches("www.").to_string())
}

/// Deterministic offline candidates keyed off the query, for running without
/// credentials. Not a production fallback.
pub fn sample_candidates(query: &str, limit: usize) -> Vec<SearchCandidate> {
    let samples = [
        SearchCandidate {
            title: format!("{query} - Wikipedia"),
            url: "https://en.wikipedia.org/wiki/Example".to_string(),
            domain: "en.wikipedia.org".to_string(),
            snippet: format!(
                "An overview of {query}, covering its history, development, and \
                 current applications across a variety of fields."
            ),
        },
        SearchCandidate {
            title: format!("Understanding {query}: a practical guide"),
            url: "https://example.com/guide".to_string(),
            domain: "example.com".to_string(),
            snippet: format!(
                "A practical introduction to {query} with worked examples and \
                 step-by-step explanations for beginners."
            ),
        },
        SearchCandidate {
            title: format!("{query} explained"),
            url: "https://example.org/explained".to_string(),
            domain: "example.org".to_string(),
            snippet: format!("What {query} is, how it works, and why it matters."),
        },
    ];
    samples.into_iter().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_of() {
        assert_eq!(
            domain_of("https://www.rust-lang.org/learn").as_deref(),
            Some("rust-lang.org")
        );
        assert_eq!(domain_of("https://tokio.rs").as_deref(), Some("tokio.rs"));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn test_sample_candidates_deterministic_and_bounded() {
        let a = sample_candidates("rust", 2);
        let b = sample_candidates("rust", 2);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].url, b[0].url);
        assert_eq!(a[0].title, b[0].title);

        assert_eq!(sample_candidates("rust", 10).len(), 3);
    }

    #[tokio::test]
    async fn test_search_without_key_uses_samples() {
        let source =
            WebSearchSource::with_endpoint("http://127.0.0.1:1/search".to_string(), None).unwrap();
        let results = source.search("anything", 5).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].title.contains("anything"));
    }

    #[tokio::test]
    async fn test_search_parses_organic_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_header("x-api-key", "k")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"organic":[
                    {"title":"Tokio","link":"https://tokio.rs/","snippet":"An async runtime"},
                    {"title":"Bad","link":"::::","snippet":"dropped"},
                    {"title":"Rust","link":"https://www.rust-lang.org/","snippet":"The language"}
                ]}"#,
            )
            .create_async()
            .await;

        let source = WebSearchSource::with_endpoint(
            format!("{}/search", server.url()),
            Some("k".to_string()),
        )
        .unwrap();
        let results = source.search("rust async", 10).await.unwrap();

        mock.assert_async().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].domain, "tokio.rs");
        assert_eq!(results[1].domain, "rust-lang.org");
        // relevance order preserved
        assert_eq!(results[0].title, "Tokio");
    }

    #[tokio::test]
    async fn test_search_api_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/search")
            .with_status(500)
            .create_async()
            .await;

        let source = WebSearchSource::with_endpoint(
            format!("{}/search", server.url()),
            Some("k".to_string()),
        )
        .unwrap();
        let err = source.search("rust", 3).await.unwrap_err();
        assert!(matches!(err, SearchSourceError::Status(500)));
    }
}
