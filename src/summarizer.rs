use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::error::SummarizeError;

/// Window during which all summarization calls skip the network after a
/// quota-exceeded response.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// Content is cut here before it goes into the prompt.
const MAX_PROMPT_CONTENT: usize = 6000;

/// Below this many characters the fallback refuses to extract sentences.
const MIN_FALLBACK_CONTENT: usize = 100;

const NOT_ENOUGH_CONTENT: &str =
    "Not enough content was available from this page to generate a summary.";

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub summary: String,
    /// 0..=100
    pub confidence: i64,
    pub sources_count: i64,
}

/// Running counters for the engine, process-wide. Snapshot via
/// [`Summarizer::stats`], zeroed via [`Summarizer::reset_stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub fallback_requests: u64,
    pub quota_exceeded_count: u64,
    pub last_quota_exceeded_at: Option<String>,
    pub consecutive_failures: u64,
}

struct EngineState {
    stats: UsageStats,
    cooldown_until: Option<Instant>,
}

/// Produces a short summary plus a confidence score for extracted page text.
///
/// One instance is shared by every in-flight pipeline: an exhausted API quota
/// is a process-wide condition, so the cooldown and counters are global by
/// design of the service, guarded by a mutex for the multi-threaded runtime.
pub struct Summarizer {
    client: Option<Client<OpenAIConfig>>,
    model: String,
    cooldown: Duration,
    state: Mutex<EngineState>,
}

impl Summarizer {
    pub fn new() -> Summarizer {
        let client = CONFIG.openai_api_key.as_ref().map(|key| {
            Client::with_config(OpenAIConfig::new().with_api_key(key.clone()))
        });
        Self::with_client(client, CONFIG.openai_model.clone(), QUOTA_COOLDOWN)
    }

    pub fn with_client(
        client: Option<Client<OpenAIConfig>>,
        model: String,
        cooldown: Duration,
    ) -> Summarizer {
        Summarizer {
            client,
            model,
            cooldown,
            state: Mutex::new(EngineState {
                stats: UsageStats::default(),
                cooldown_until: None,
            }),
        }
    }

    /// Summarize `content` (already extracted page text). Quota and rate-limit
    /// conditions are absorbed into the heuristic fallback; every other API
    /// failure is a hard error for the caller to handle.
    pub async fn summarize(
        &self,
        content: &str,
        title: &str,
        url: &str,
    ) -> Result<Summary, SummarizeError> {
        {
            let mut state = self.state.lock().expect("summarizer state lock poisoned");
            state.stats.total_requests += 1;
        }

        let Some(client) = &self.client else {
            self.count_fallback();
            return Ok(fallback_summary(content));
        };

        if self.in_cooldown() {
            self.count_fallback();
            return Ok(fallback_summary(content));
        }

        match self.request_summary(client, content, title, url).await {
            Ok(summary) => {
                let mut state = self.state.lock().expect("summarizer state lock poisoned");
                state.stats.successful_requests += 1;
                state.stats.consecutive_failures = 0;
                // A success ends any cooldown early.
                state.cooldown_until = None;
                Ok(summary)
            }
            Err(err) if is_quota_error(&err) => {
                warn!("summarization quota exhausted, entering cooldown: {err}");
                {
                    let mut state = self.state.lock().expect("summarizer state lock poisoned");
                    state.stats.quota_exceeded_count += 1;
                    state.stats.last_quota_exceeded_at =
                        Some(chrono::Utc::now().to_rfc3339());
                    state.stats.consecutive_failures += 1;
                    state.cooldown_until = Some(Instant::now() + self.cooldown);
                }
                self.count_fallback();
                Ok(fallback_summary(content))
            }
            Err(err) => {
                let mut state = self.state.lock().expect("summarizer state lock poisoned");
                state.stats.failed_requests += 1;
                state.stats.consecutive_failures += 1;
                Err(SummarizeError::Failed(err.to_string()))
            }
        }
    }

    async fn request_summary(
        &self,
        client: &Client<OpenAIConfig>,
        content: &str,
        title: &str,
        url: &str,
    ) -> Result<Summary, OpenAIError> {
        let content = truncate_chars(content, MAX_PROMPT_CONTENT);
        let prompt = format!(
            "Summarize the following web page in 2-3 objective sentences. Respond with only \
             a JSON object of the form {{\"summary\": \"...\", \"confidence\": <integer 0-100, \
             your confidence that the summary accurately reflects the page>, \
             \"sources_count\": <integer, number of distinct references the page cites>}}.\n\n\
             Title: {title}\nURL: {url}\n\nContent:\n{content}"
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into()])
            .max_tokens(300_u32)
            .temperature(0.3)
            .build()?;

        let response = client.chat().create(request).await?;

        let raw = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        match parse_summary_response(&raw) {
            Ok(summary) => Ok(summary),
            Err(e) => Err(OpenAIError::InvalidArgument(e.to_string())),
        }
    }

    pub fn in_cooldown(&self) -> bool {
        let state = self.state.lock().expect("summarizer state lock poisoned");
        state
            .cooldown_until
            .map(|until| Instant::now() < until)
            .unwrap_or(false)
    }

    pub fn stats(&self) -> UsageStats {
        self.state
            .lock()
            .expect("summarizer state lock poisoned")
            .stats
            .clone()
    }

    pub fn reset_stats(&self) {
        let mut state = self.state.lock().expect("summarizer state lock poisoned");
        state.stats = UsageStats::default();
    }

    fn count_fallback(&self) {
        let mut state = self.state.lock().expect("summarizer state lock poisoned");
        state.stats.fallback_requests += 1;
        info!("using heuristic fallback summary");
    }
}

fn is_quota_error(err: &OpenAIError) -> bool {
    match err {
        OpenAIError::ApiError(api) => {
            let mut haystack = api.message.to_lowercase();
            if let Some(kind) = &api.r#type {
                haystack.push(' ');
                haystack.push_str(&kind.to_lowercase());
            }
            haystack.contains("quota")
                || haystack.contains("rate limit")
                || haystack.contains("rate_limit")
                || haystack.contains("429")
        }
        _ => false,
    }
}

#[derive(Deserialize)]
struct RawSummary {
    summary: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    sources_count: i64,
}

/// Parse the model's JSON reply. Code fences and leading prose are tolerated;
/// anything without a JSON object in it is a hard failure.
pub fn parse_summary_response(raw: &str) -> Result<Summary, SummarizeError> {
    let start = raw
        .find('{')
        .ok_or_else(|| SummarizeError::MalformedResponse(raw.to_string()))?;
    let end = raw
        .rfind('}')
        .ok_or_else(|| SummarizeError::MalformedResponse(raw.to_string()))?;
    if end < start {
        return Err(SummarizeError::MalformedResponse(raw.to_string()));
    }

    let parsed: RawSummary = serde_json::from_str(&raw[start..=end])
        .map_err(|e| SummarizeError::MalformedResponse(e.to_string()))?;

    Ok(Summary {
        summary: parsed.summary,
        confidence: (parsed.confidence.round() as i64).clamp(0, 100),
        sources_count: parsed.sources_count.max(0),
    })
}

// =============================================================================
// Heuristic fallback
// =============================================================================

/// Local summary used when no credential is configured, the quota is
/// exhausted, or a cooldown is active. No network involved.
pub fn fallback_summary(content: &str) -> Summary {
    let confidence = fallback_confidence(content);
    let sources_count = estimate_sources_count(content);

    if content.len() < MIN_FALLBACK_CONTENT {
        return Summary {
            summary: NOT_ENOUGH_CONTENT.to_string(),
            confidence,
            sources_count,
        };
    }

    let sentences: Vec<&str> = content
        .split_terminator(['.', '!', '?'])
        .map(|s| s.trim())
        .filter(|s| s.len() > 20)
        .take(2)
        .collect();

    let summary = if sentences.is_empty() {
        NOT_ENOUGH_CONTENT.to_string()
    } else {
        format!("{}.", sentences.join(". "))
    };

    Summary {
        summary,
        confidence,
        sources_count,
    }
}

/// Word-count base clamped to [40,85], nudged up for structural cues, capped
/// at 90.
pub fn fallback_confidence(content: &str) -> i64 {
    let word_count = content.split_whitespace().count() as i64;
    let base = (word_count / 15).clamp(40, 85);

    let lower = content.to_lowercase();
    let mut boost = 0;
    const STRUCTURE_CUES: &[&str] = &[
        "introduction",
        "overview",
        "conclusion",
        "summary",
        "section",
        "chapter",
    ];
    if STRUCTURE_CUES.iter().any(|cue| lower.contains(cue)) {
        boost += 3;
    }
    if content.chars().any(|c| c.is_ascii_digit()) {
        boost += 4;
    }
    const CITATION_CUES: &[&str] = &["according to", "et al", "cited", "reference", "study"];
    if CITATION_CUES.iter().any(|cue| lower.contains(cue)) {
        boost += 3;
    }

    (base + boost).min(90)
}

/// Rough count of distinct references in the text, capped at 10.
pub fn estimate_sources_count(content: &str) -> i64 {
    let urls = content.matches("http://").count() + content.matches("https://").count();

    // Citation markers like [1], [23]
    let mut markers = 0;
    let bytes = content.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j > i + 1 && j < bytes.len() && bytes[j] == b']' {
                markers += 1;
                i = j;
            }
        }
        i += 1;
    }

    let lower = content.to_lowercase();
    const REFERENCE_CUES: &[&str] = &["references", "sources", "bibliography", "citations"];
    let keyword_hits = REFERENCE_CUES
        .iter()
        .filter(|cue| lower.contains(*cue))
        .count();

    ((urls + markers + keyword_hits) as i64).min(10)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
