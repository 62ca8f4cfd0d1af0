use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::error::ScrapeError;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Below this many characters the extraction is considered unusable.
pub const MIN_CONTENT_LEN: usize = 100;
/// Extracted text is truncated here to bound downstream summarization cost.
pub const MAX_CONTENT_LEN: usize = 8000;
const WORDS_PER_MINUTE: usize = 200;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// Prioritized "likely main content" selectors, most specific first.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "[role=\"main\"]",
    ".post-content",
    ".article-content",
    ".entry-content",
    ".article-body",
    ".story-body",
    ".content",
    "#content",
    "main",
];

// Date-bearing selectors; time[datetime] preferred.
const DATE_SELECTORS: &[&str] = &[
    "time[datetime]",
    "meta[property=\"article:published_time\"]",
    "meta[name=\"date\"]",
    ".published",
    ".post-date",
    ".date",
];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript", "iframe", "svg",
];

// Parse the selector lists once per process.
static CONTENT_SELECTORS: OnceLock<Vec<Selector>> = OnceLock::new();
static DATE_SELECTOR_LIST: OnceLock<Vec<Selector>> = OnceLock::new();

fn content_selectors() -> &'static [Selector] {
    CONTENT_SELECTORS.get_or_init(|| {
        MAIN_CONTENT_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect()
    })
}

fn date_selectors() -> &'static [Selector] {
    DATE_SELECTOR_LIST.get_or_init(|| {
        DATE_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect()
    })
}

#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub text: String,
    pub word_count: usize,
    pub reading_time_minutes: i64,
    pub published_date: Option<String>,
}

/// Fetches a page and pulls out its readable main content.
pub struct ContentExtractor {
    client: reqwest::Client,
}

impl ContentExtractor {
    pub fn new() -> Result<ContentExtractor, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(ContentExtractor { client })
    }

    pub async fn extract(&self, url: &str) -> Result<ExtractedContent, ScrapeError> {
        debug!("fetching {url}");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }

        let html = response.text().await?;
        extract_from_html(&html)
    }
}

/// HTML → cleaned content, separate from the fetch so it is testable offline.
pub fn extract_from_html(html: &str) -> Result<ExtractedContent, ScrapeError> {
    let document = Html::parse_document(html);

    let mut text = String::new();
    for selector in content_selectors() {
        for element in document.select(selector) {
            collect_text(*element, &mut text);
        }
        if collapse(&text).len() >= MIN_CONTENT_LEN {
            break;
        }
    }
    let mut text = collapse(&text);

    // No selector hit anything useful; fall back to whole-body text.
    if text.len() < MIN_CONTENT_LEN {
        let body = html2text::from_read(html.as_bytes(), 200)
            .map_err(|e| ScrapeError::Request(e.to_string()))?;
        text = collapse(&body);
    }

    if text.len() < MIN_CONTENT_LEN {
        return Err(ScrapeError::InsufficientContent(text.len()));
    }

    let text = truncate_chars(&text, MAX_CONTENT_LEN);
    let word_count = text.split_whitespace().count();
    let reading_time_minutes = word_count.div_ceil(WORDS_PER_MINUTE) as i64;
    let published_date = extract_published_date(&document);

    Ok(ExtractedContent {
        text,
        word_count,
        reading_time_minutes,
        published_date,
    })
}

/// Depth-first text collection that skips script/style/nav/chrome subtrees and
/// anything class-marked as an ad.
fn collect_text(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(t) => {
            out.push_str(&t);
            out.push(' ');
        }
        Node::Element(el) => {
            if NOISE_TAGS.contains(&el.name()) {
                return;
            }
            if is_ad_marked(el.attr("class")) || is_ad_marked(el.attr("id")) {
                return;
            }
            for child in node.children() {
                collect_text(child, out);
            }
        }
        _ => {
            for child in node.children() {
                collect_text(child, out);
            }
        }
    }
}

fn is_ad_marked(attr: Option<&str>) -> bool {
    let Some(attr) = attr else { return false };
    attr.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .any(|token| {
            let t = token.to_ascii_lowercase();
            t == "ad" || t == "ads" || t == "advert" || t == "advertisement" || t == "sponsored"
        })
}

fn extract_published_date(document: &Html) -> Option<String> {
    for selector in date_selectors() {
        if let Some(element) = document.select(selector).next() {
            if let Some(datetime) = element.value().attr("datetime") {
                return Some(datetime.trim().to_string());
            }
            if let Some(content) = element.value().attr("content") {
                return Some(content.trim().to_string());
            }
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}
