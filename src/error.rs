use thiserror::Error;

/// The result source could not produce any candidates. Terminal for the whole
/// pipeline run: the owning search transitions to `error`.
#[derive(Error, Debug)]
pub enum SearchSourceError {
    #[error("search API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search API returned status {0}")]
    Status(u16),
    #[error("search API response could not be decoded: {0}")]
    Decode(String),
}

/// Per-candidate extraction failure. Never aborts the pipeline; downgrades the
/// candidate to `partial` (snippet substituted) or `failed`.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("request timed out")]
    Timeout,
    #[error("page returned status {0}")]
    Status(u16),
    #[error("fetch failed: {0}")]
    Request(String),
    #[error("insufficient content ({0} chars after fallback)")]
    InsufficientContent(usize),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScrapeError::Timeout
        } else {
            ScrapeError::Request(err.to_string())
        }
    }
}

/// Hard summarization failure for non-quota causes (malformed response, auth
/// failure). Quota and rate-limit conditions never surface here; the engine
/// absorbs them into its fallback path and counts them in usage stats.
#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("summarization failed: {0}")]
    Failed(String),
    #[error("summary response was not valid JSON: {0}")]
    MalformedResponse(String),
}
