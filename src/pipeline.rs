use anyhow::{Context, Result, bail};
use mongodb::bson::oid::ObjectId;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::data_models::{ResultMetadata, ScrapingStatus, SearchResultItem, SearchedUrl};
use crate::db::{Database, ResultItemRepo, SearchRepo};
use crate::extractor::ContentExtractor;
use crate::search_source::{MAX_RESULTS, SearchCandidate, WebSearchSource};
use crate::summarizer::Summarizer;

/// Results at or below this confidence are hidden from clients (never deleted).
pub const CONFIDENCE_DISPLAY_THRESHOLD: i64 = 80;

/// Flat deduction applied to confidence produced from snippet-substituted
/// content, floored at 0.
pub const PARTIAL_PENALTY: i64 = 30;

/// A snippet must be longer than this to stand in for failed extraction, and
/// content must be longer than this to be worth summarizing.
pub const MIN_USABLE_CONTENT: usize = 50;

static STOP_WORDS: OnceLock<HashSet<String>> = OnceLock::new();

fn stop_words() -> &'static HashSet<String> {
    STOP_WORDS.get_or_init(|| {
        stop_words::get(stop_words::LANGUAGE::English)
            .into_iter()
            .map(|w| w.to_string())
            .collect()
    })
}

/// Runs the search → scrape → summarize pipeline for one submitted search.
///
/// Candidates are processed strictly sequentially. Per-candidate failures are
/// recorded on the persisted item and never abort the run; only an empty
/// candidate list or an orchestration-level failure moves the search to
/// `error`.
pub struct Pipeline {
    db: Database,
    source: WebSearchSource,
    extractor: ContentExtractor,
    summarizer: Arc<Summarizer>,
}

impl Pipeline {
    pub fn new(db: Database, summarizer: Arc<Summarizer>) -> Result<Pipeline> {
        let source = WebSearchSource::new().context("failed to build search source")?;
        let extractor = ContentExtractor::new().context("failed to build extractor")?;
        Ok(Self::with_parts(db, source, extractor, summarizer))
    }

    /// Assemble a pipeline from pre-built components. Tests use this to point
    /// the source and summarizer at stand-in endpoints.
    pub fn with_parts(
        db: Database,
        source: WebSearchSource,
        extractor: ContentExtractor,
        summarizer: Arc<Summarizer>,
    ) -> Pipeline {
        Pipeline {
            db,
            source,
            extractor,
            summarizer,
        }
    }

    /// Entry point for the background job. Never returns an error; any
    /// orchestration failure lands the search in `error`.
    pub async fn run(&self, search_id: ObjectId, query: &str) {
        let started = Instant::now();
        match self.process(search_id, query, started).await {
            Ok(count) => {
                info!(
                    "search {} completed: {} results in {}ms",
                    search_id,
                    count,
                    started.elapsed().as_millis()
                );
            }
            Err(e) => {
                error!("search {} failed: {:#}", search_id, e);
                let searches = SearchRepo::new(&self.db);
                if let Err(e) = searches.mark_error(search_id).await {
                    error!("search {} could not be marked as error: {:#}", search_id, e);
                }
            }
        }
    }

    async fn process(&self, search_id: ObjectId, query: &str, started: Instant) -> Result<usize> {
        let searches = SearchRepo::new(&self.db);
        let results = ResultItemRepo::new(&self.db);

        let candidates = self
            .source
            .search(query, MAX_RESULTS)
            .await
            .context("result source unavailable")?;
        if candidates.is_empty() {
            bail!("result source returned no candidates");
        }

        let urls: Vec<SearchedUrl> = candidates
            .iter()
            .map(|c| SearchedUrl {
                title: c.title.clone(),
                url: c.url.clone(),
                domain: c.domain.clone(),
            })
            .collect();
        searches.set_searched_urls(search_id, &urls).await?;

        // Strictly one candidate at a time: keeps target sites and third-party
        // rate limits comfortable at the cost of throughput.
        for candidate in &candidates {
            let item = self.process_candidate(search_id, query, candidate).await;
            results.insert(&item).await.context("failed to persist result")?;
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        searches
            .mark_completed(search_id, candidates.len() as i64, elapsed_ms)
            .await?;
        Ok(candidates.len())
    }

    /// Scrape and summarize a single candidate. Infallible: every outcome maps
    /// to a persistable item.
    async fn process_candidate(
        &self,
        search_id: ObjectId,
        query: &str,
        candidate: &SearchCandidate,
    ) -> SearchResultItem {
        match self.extractor.extract(&candidate.url).await {
            Ok(content) => {
                let mut item = SearchResultItem::new(
                    search_id,
                    candidate.title.clone(),
                    candidate.url.clone(),
                    candidate.domain.clone(),
                    ScrapingStatus::Success,
                );
                item.published_date = content.published_date.clone();
                item.reading_time_minutes = Some(content.reading_time_minutes);
                self.summarize_into(&mut item, &content.text, candidate, query, false)
                    .await;
                item
            }
            Err(scrape_err) if candidate.snippet.len() > MIN_USABLE_CONTENT => {
                warn!(
                    "scrape of {} failed ({scrape_err}), substituting snippet",
                    candidate.url
                );
                let mut item = SearchResultItem::new(
                    search_id,
                    candidate.title.clone(),
                    candidate.url.clone(),
                    candidate.domain.clone(),
                    ScrapingStatus::Partial,
                );
                item.error_message = Some(scrape_err.to_string());
                self.summarize_into(&mut item, &candidate.snippet, candidate, query, true)
                    .await;
                item
            }
            Err(scrape_err) => {
                warn!("scrape of {} failed: {scrape_err}", candidate.url);
                let mut item = SearchResultItem::new(
                    search_id,
                    candidate.title.clone(),
                    candidate.url.clone(),
                    candidate.domain.clone(),
                    ScrapingStatus::Failed,
                );
                item.error_message = Some(scrape_err.to_string());
                if !candidate.snippet.trim().is_empty() {
                    // Snippet too short to summarize but still worth showing
                    // verbatim, at a fixed low confidence.
                    item.summary = Some(candidate.snippet.clone());
                    item.confidence = Some(20);
                }
                item
            }
        }
    }

    /// Summarize usable content into `item`, with the orchestrator's own
    /// narrow fallback for unexpected (non-quota) engine failures.
    async fn summarize_into(
        &self,
        item: &mut SearchResultItem,
        content: &str,
        candidate: &SearchCandidate,
        query: &str,
        partial: bool,
    ) {
        if content.len() <= MIN_USABLE_CONTENT {
            return;
        }

        let (summary, confidence, sources_count) = match self
            .summarizer
            .summarize(content, &candidate.title, &candidate.url)
            .await
        {
            Ok(s) => {
                let confidence = if partial {
                    apply_partial_penalty(s.confidence)
                } else {
                    s.confidence
                };
                (s.summary, confidence, s.sources_count)
            }
            Err(e) => {
                warn!("summarization of {} failed hard: {e}", candidate.url);
                let confidence = if partial { 30 } else { 50 };
                (basic_summary(content), confidence, 0)
            }
        };

        item.summary = Some(summary);
        item.confidence = Some(confidence);
        item.sources_count = sources_count;
        item.set_keywords(&extract_keywords(content, 8));
        item.set_metadata(&build_metadata(query, &candidate.domain, content));
    }
}

pub fn apply_partial_penalty(confidence: i64) -> i64 {
    (confidence - PARTIAL_PENALTY).max(0)
}

/// Minimal local summary for the orchestrator's narrow fallback path. Distinct
/// from the engine's heuristic fallback: no confidence scoring here.
pub fn basic_summary(content: &str) -> String {
    let sentences: Vec<&str> = content
        .split_terminator(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    if sentences.is_empty() {
        content.chars().take(200).collect()
    } else {
        format!("{}.", sentences.join(". "))
    }
}

/// Most frequent non-stop-word terms of the content, for the stored keyword
/// blob.
pub fn extract_keywords(content: &str, limit: usize) -> Vec<String> {
    let words = stop_words();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for token in content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
    {
        if token.chars().all(char::is_numeric) || words.contains(&token) {
            continue;
        }
        *counts.entry(token).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

pub fn build_metadata(query: &str, domain: &str, content: &str) -> ResultMetadata {
    ResultMetadata {
        topic: Some(query.to_string()),
        category: Some(categorize_domain(domain).to_string()),
        entities: Some(extract_entities(content, 5)),
    }
}

fn categorize_domain(domain: &str) -> &'static str {
    if domain.contains("wiki") {
        "reference"
    } else if domain.ends_with(".edu") {
        "education"
    } else if domain.ends_with(".gov") {
        "government"
    } else if domain.ends_with(".org") {
        "organization"
    } else {
        "general"
    }
}

/// Capitalized tokens, deduplicated in order of appearance.
fn extract_entities(content: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for token in content.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        if token.len() > 3
            && token.chars().next().is_some_and(|c| c.is_uppercase())
            && token.chars().skip(1).any(|c| c.is_lowercase())
            && seen.insert(token.to_string())
        {
            entities.push(token.to_string());
            if entities.len() == limit {
                break;
            }
        }
    }
    entities
}
