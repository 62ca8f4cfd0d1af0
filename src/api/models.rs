use serde::{Deserialize, Serialize};

use crate::data_models::{
    ResultMetadata, ScrapingStatus, SearchRequest, SearchResultItem, SearchStatus, SearchedUrl,
};

#[derive(Debug, Deserialize)]
pub struct SubmitSearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSearchResponse {
    pub search_id: String,
    pub status: SearchStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchView {
    pub id: String,
    pub query: String,
    pub status: SearchStatus,
    /// Count after the confidence display filter.
    pub total_results: usize,
    /// Count of all persisted items, before filtering.
    pub original_results_count: usize,
    pub search_time_ms: i64,
    pub saved: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItemView {
    pub id: String,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub published_date: Option<String>,
    pub reading_time_minutes: Option<i64>,
    pub scraping_status: ScrapingStatus,
    pub summary: Option<String>,
    pub confidence: Option<i64>,
    pub sources_count: i64,
    pub keywords: Vec<String>,
    pub metadata: ResultMetadata,
    pub error_message: Option<String>,
}

impl From<SearchResultItem> for ResultItemView {
    fn from(item: SearchResultItem) -> Self {
        let keywords = item.parsed_keywords();
        let metadata = item.parsed_metadata();
        ResultItemView {
            id: item.id.to_hex(),
            title: item.title,
            url: item.url,
            domain: item.domain,
            published_date: item.published_date,
            reading_time_minutes: item.reading_time_minutes,
            scraping_status: item.scraping_status,
            summary: item.summary,
            confidence: item.confidence,
            sources_count: item.sources_count,
            keywords,
            metadata,
            error_message: item.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSearchResponse {
    pub search: SearchView,
    pub results: Vec<ResultItemView>,
    pub searched_urls: Vec<SearchedUrl>,
}

impl SearchView {
    pub fn from_search(search: &SearchRequest, filtered: usize, original: usize) -> SearchView {
        SearchView {
            id: search.id.to_hex(),
            query: search.query.clone(),
            status: search.status,
            total_results: filtered,
            original_results_count: original,
            search_time_ms: search.search_time_ms,
            saved: search.saved,
        }
    }
}
