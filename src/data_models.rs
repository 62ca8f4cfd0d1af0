use mongodb::bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Lifecycle of one submitted search. `Searching` is the only non-terminal
/// state; the pipeline moves a search to exactly one of the other two.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Searching,
    Completed,
    Error,
}

/// Per-result outcome of content extraction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScrapingStatus {
    /// Extractor succeeded.
    Success,
    /// Extractor failed, search snippet substituted as content.
    Partial,
    /// Neither extracted content nor a usable snippet.
    Failed,
}

/// One candidate page as returned by the result source, before scraping.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchedUrl {
    pub title: String,
    pub url: String,
    pub domain: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchRequest {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub query: String,
    pub status: SearchStatus,
    pub total_results: i64,
    pub search_time_ms: i64,
    pub saved: bool,
    /// Candidate URLs recorded on the entity itself so the fetch response can
    /// list them after completion, with the same lifetime as the search.
    pub searched_urls: Vec<SearchedUrl>,
    pub created_at: DateTime,
}

impl SearchRequest {
    pub fn new(query: String) -> SearchRequest {
        SearchRequest {
            id: ObjectId::new(),
            query,
            status: SearchStatus::Searching,
            total_results: 0,
            search_time_ms: 0,
            saved: false,
            searched_urls: Vec::new(),
            created_at: DateTime::now(),
        }
    }
}

/// Structured metadata attached to a result. Stored as a JSON text blob (see
/// `SearchResultItem::metadata`) for compatibility with the existing schema.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchResultItem {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub search_id: ObjectId,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub published_date: Option<String>,
    pub reading_time_minutes: Option<i64>,
    pub scraping_status: ScrapingStatus,
    pub summary: Option<String>,
    /// 0..=100. Populated only when scraping succeeded or partially succeeded,
    /// or when a snippet stood in for failed content (fixed low value).
    pub confidence: Option<i64>,
    pub sources_count: i64,
    /// JSON-encoded array of strings, e.g. `["rust","async"]`.
    pub keywords: String,
    /// JSON-encoded [`ResultMetadata`] object.
    pub metadata: String,
    pub error_message: Option<String>,
    pub created_at: DateTime,
}

impl SearchResultItem {
    pub fn new(
        search_id: ObjectId,
        title: String,
        url: String,
        domain: String,
        scraping_status: ScrapingStatus,
    ) -> SearchResultItem {
        SearchResultItem {
            id: ObjectId::new(),
            search_id,
            title,
            url,
            domain,
            published_date: None,
            reading_time_minutes: None,
            scraping_status,
            summary: None,
            confidence: None,
            sources_count: 0,
            keywords: "[]".to_string(),
            metadata: "{}".to_string(),
            error_message: None,
            created_at: DateTime::now(),
        }
    }

    pub fn set_keywords(&mut self, keywords: &[String]) {
        self.keywords = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string());
    }

    pub fn parsed_keywords(&self) -> Vec<String> {
        serde_json::from_str(&self.keywords).unwrap_or_default()
    }

    pub fn set_metadata(&mut self, metadata: &ResultMetadata) {
        self.metadata = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());
    }

    pub fn parsed_metadata(&self) -> ResultMetadata {
        serde_json::from_str(&self.metadata).unwrap_or_default()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
}

/// Account record mirrored from the external auth provider. Only the fields
/// the pipeline needs: quota accounting plus billing identifiers.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,
    pub display_name: String,
    pub subscription_tier: SubscriptionTier,
    pub subscription_status: String,
    pub searches_limit: i64,
    pub searches_used: i64,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub created_at: DateTime,
}

impl User {
    pub fn new(email: String, display_name: String) -> User {
        User {
            id: ObjectId::new(),
            email,
            display_name,
            subscription_tier: SubscriptionTier::Free,
            subscription_status: "active".to_string(),
            searches_limit: 20,
            searches_used: 0,
            billing_customer_id: None,
            billing_subscription_id: None,
            created_at: DateTime::now(),
        }
    }

    pub fn over_quota(&self) -> bool {
        self.searches_used >= self.searches_limit
    }
}
