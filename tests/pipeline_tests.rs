use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

use distill::api::handlers;
use distill::api::models::SubmitSearchRequest;
use distill::api::AppState;
use distill::data_models::{ScrapingStatus, SearchStatus, User};
use distill::db::{Database, ResultItemRepo, SearchRepo, UserRepo};
use distill::extractor::ContentExtractor;
use distill::jobs::Jobs;
use distill::pipeline::Pipeline;
use distill::search_source::WebSearchSource;
use distill::summarizer::{QUOTA_COOLDOWN, Summarizer};

mod test_helpers {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

    pub fn unique_test_db_name() -> String {
        let count = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        format!("distill_pipeline_test_{}_{}", timestamp, count)
    }

    pub async fn create_test_db() -> Result<(Database, String)> {
        dotenvy::dotenv().ok();
        let uri =
            std::env::var("MONGO_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let db_name = unique_test_db_name();
        let db = Database::new(&uri, &db_name).await?;
        Ok((db, db_name))
    }

    pub async fn cleanup_test_db(db: &Database, db_name: &str) -> Result<()> {
        db.client().database(db_name).drop().await?;
        Ok(())
    }

    /// An article long and cue-laden enough that the offline fallback scores
    /// it above the display threshold (word-count base clamps at 85, cue
    /// boosts push it to the 90 cap).
    pub fn high_confidence_page() -> String {
        let body = "According to the overview published in 2024, the subject matters a lot. "
            .repeat(150);
        format!("<html><body><article><p>{body}</p></article></body></html>")
    }

    /// Mock search API + target pages on one server. Returns the pipeline and
    /// the candidate layout it will see.
    pub async fn mock_search_stack(
        db: &Database,
        organic: &str,
    ) -> (mockito::ServerGuard, Arc<Pipeline>, Arc<Summarizer>) {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("POST", "/search")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(organic.to_string())
            .create_async()
            .await;

        server
            .mock("GET", "/good")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(high_confidence_page())
            .create_async()
            .await;

        let source = WebSearchSource::with_endpoint(
            format!("{}/search", server.url()),
            Some("test-key".to_string()),
        )
        .unwrap();
        let summarizer = Arc::new(Summarizer::with_client(
            None,
            "gpt-4o-mini".to_string(),
            QUOTA_COOLDOWN,
        ));
        let pipeline = Arc::new(Pipeline::with_parts(
            db.clone(),
            source,
            ContentExtractor::new().unwrap(),
            Arc::clone(&summarizer),
        ));
        (server, pipeline, summarizer)
    }

    pub fn organic_one_good(server_url: &str) -> String {
        format!(
            r#"{{"organic":[
                {{"title":"Good page","link":"{server_url}/good","snippet":"A good page"}}
            ]}}"#
        )
    }
}

use test_helpers::*;

#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_pipeline_outcomes_per_candidate() -> Result<()> {
    let (db, db_name) = create_test_db().await?;

    // Four candidates covering every scraping outcome. The search body has to
    // reference the server's own URL, so the server comes first.
    let mut server = mockito::Server::new_async().await;
    let long_snippet = "This snippet is comfortably longer than fifty characters and \
                        keeps enough words for a heuristic summary.";
    let organic = format!(
        r#"{{"organic":[
            {{"title":"Good","link":"__URL__/good","snippet":"A good page"}},
            {{"title":"Gone long","link":"__URL__/gone1","snippet":"{long_snippet}"}},
            {{"title":"Gone short","link":"__URL__/gone2","snippet":"Too short."}},
            {{"title":"Gone empty","link":"__URL__/gone3","snippet":""}}
        ]}}"#
    )
    .replace("__URL__", &server.url());
    server
        .mock("POST", "/search")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(organic)
        .create_async()
        .await;
    server
        .mock("GET", "/good")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(high_confidence_page())
        .create_async()
        .await;
    for path in ["/gone1", "/gone2", "/gone3"] {
        server
            .mock("GET", path)
            .with_status(404)
            .create_async()
            .await;
    }

    let source = WebSearchSource::with_endpoint(
        format!("{}/search", server.url()),
        Some("test-key".to_string()),
    )?;
    let summarizer = Arc::new(Summarizer::with_client(
        None,
        "gpt-4o-mini".to_string(),
        QUOTA_COOLDOWN,
    ));
    let pipeline = Pipeline::with_parts(
        db.clone(),
        source,
        ContentExtractor::new()?,
        Arc::clone(&summarizer),
    );

    let searches = SearchRepo::new(&db);
    let items = ResultItemRepo::new(&db);
    let search = distill::data_models::SearchRequest::new("test".to_string());
    let search_id = searches.insert(&search).await?;

    pipeline.run(search_id, "test").await;

    let search = searches.find_by_id(search_id).await?.unwrap();
    assert_eq!(search.status, SearchStatus::Completed);
    assert_eq!(search.total_results, 4);
    assert_eq!(search.searched_urls.len(), 4);
    assert!(search.search_time_ms >= 0);

    let mut persisted = items.find_by_search(search_id).await?;
    assert_eq!(persisted.len(), 4);
    persisted.sort_by(|a, b| a.title.cmp(&b.title));
    // titles sorted: "Gone empty", "Gone long", "Gone short", "Good"

    let gone_empty = &persisted[0];
    assert_eq!(gone_empty.scraping_status, ScrapingStatus::Failed);
    assert!(gone_empty.summary.is_none());
    assert!(gone_empty.confidence.is_none());
    assert!(gone_empty.error_message.is_some());

    let gone_long = &persisted[1];
    assert_eq!(gone_long.scraping_status, ScrapingStatus::Partial);
    assert!(gone_long.summary.is_some());
    // Heuristic confidence for a short snippet, minus the 30-point penalty
    let confidence = gone_long.confidence.unwrap();
    assert!((0..=60).contains(&confidence), "got {confidence}");

    let gone_short = &persisted[2];
    assert_eq!(gone_short.scraping_status, ScrapingStatus::Failed);
    assert_eq!(gone_short.summary.as_deref(), Some("Too short."));
    assert_eq!(gone_short.confidence, Some(20));
    assert_eq!(gone_short.sources_count, 0);

    let good = &persisted[3];
    assert_eq!(good.scraping_status, ScrapingStatus::Success);
    assert!(good.reading_time_minutes.is_some());
    let confidence = good.confidence.unwrap();
    assert!((40..=90).contains(&confidence), "got {confidence}");
    assert!(!good.parsed_keywords().is_empty());
    assert_eq!(good.parsed_metadata().topic.as_deref(), Some("test"));

    // Every confidence in range
    for item in &persisted {
        if let Some(c) = item.confidence {
            assert!((0..=100).contains(&c));
        }
    }

    cleanup_test_db(&db, &db_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_empty_result_list_marks_search_error() -> Result<()> {
    let (db, db_name) = create_test_db().await?;
    let (_server, pipeline, _summarizer) = mock_search_stack(&db, r#"{"organic":[]}"#).await;

    let searches = SearchRepo::new(&db);
    let search = distill::data_models::SearchRequest::new("nothing".to_string());
    let search_id = searches.insert(&search).await?;

    pipeline.run(search_id, "nothing").await;

    let search = searches.find_by_id(search_id).await?.unwrap();
    assert_eq!(search.status, SearchStatus::Error);

    cleanup_test_db(&db, &db_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_submit_and_fetch_through_handlers() -> Result<()> {
    let (db, db_name) = create_test_db().await?;

    let mut server = mockito::Server::new_async().await;
    let organic = organic_one_good(&server.url());
    server
        .mock("POST", "/search")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(organic)
        .create_async()
        .await;
    server
        .mock("GET", "/good")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(high_confidence_page())
        .create_async()
        .await;

    let source = WebSearchSource::with_endpoint(
        format!("{}/search", server.url()),
        Some("test-key".to_string()),
    )?;
    let summarizer = Arc::new(Summarizer::with_client(
        None,
        "gpt-4o-mini".to_string(),
        QUOTA_COOLDOWN,
    ));
    let pipeline = Arc::new(Pipeline::with_parts(
        db.clone(),
        source,
        ContentExtractor::new()?,
        Arc::clone(&summarizer),
    ));
    let state = Arc::new(AppState {
        db: db.clone(),
        summarizer,
        pipeline,
        jobs: Arc::new(Jobs::new()),
    });

    let Json(submitted) = handlers::submit_search(
        State(Arc::clone(&state)),
        HeaderMap::new(),
        Json(SubmitSearchRequest {
            query: "test".to_string(),
        }),
    )
    .await
    .map_err(|(code, msg)| anyhow::anyhow!("submit failed: {code} {msg}"))?;
    assert_eq!(submitted.status, SearchStatus::Searching);

    // Poll until the background job finishes.
    let mut response = None;
    for _ in 0..100 {
        let Json(fetched) =
            handlers::fetch_search(State(Arc::clone(&state)), Path(submitted.search_id.clone()))
                .await
                .map_err(|(code, msg)| anyhow::anyhow!("fetch failed: {code} {msg}"))?;
        if fetched.search.status != SearchStatus::Searching {
            response = Some(fetched);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let response = response.expect("pipeline did not finish in time");

    assert_eq!(response.search.status, SearchStatus::Completed);
    assert_eq!(response.search.original_results_count, 1);
    assert_eq!(response.search.total_results, response.results.len());
    assert!(response.search.total_results <= response.search.original_results_count);
    assert_eq!(response.searched_urls.len(), 1);
    for item in &response.results {
        assert!(item.confidence.unwrap() > 80);
    }

    // Fetching again returns the identical filtered set (read is pure).
    let Json(again) =
        handlers::fetch_search(State(Arc::clone(&state)), Path(submitted.search_id.clone()))
            .await
            .map_err(|(code, msg)| anyhow::anyhow!("fetch failed: {code} {msg}"))?;
    assert_eq!(
        serde_json::to_value(&again.results).unwrap(),
        serde_json::to_value(&response.results).unwrap()
    );

    // Unknown id is a 404.
    let missing = handlers::fetch_search(
        State(Arc::clone(&state)),
        Path("000000000000000000000000".to_string()),
    )
    .await;
    assert_eq!(missing.unwrap_err().0, StatusCode::NOT_FOUND);

    cleanup_test_db(&db, &db_name).await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running MongoDB (set MONGO_URI)"]
async fn test_quota_gating_on_submit() -> Result<()> {
    let (db, db_name) = create_test_db().await?;
    let (_server, pipeline, summarizer) =
        mock_search_stack(&db, r#"{"organic":[]}"#).await;

    let state = Arc::new(AppState {
        db: db.clone(),
        summarizer,
        pipeline,
        jobs: Arc::new(Jobs::new()),
    });

    let users = UserRepo::new(&db);
    let mut user = User::new("quota@example.com".to_string(), "Quota".to_string());
    user.searches_limit = 1;
    let user_id = users.insert(&user).await?;

    let mut headers = HeaderMap::new();
    headers.insert("x-user-id", HeaderValue::from_str(&user_id.to_hex())?);

    let first = handlers::submit_search(
        State(Arc::clone(&state)),
        headers.clone(),
        Json(SubmitSearchRequest {
            query: "first".to_string(),
        }),
    )
    .await;
    assert!(first.is_ok());

    let second = handlers::submit_search(
        State(Arc::clone(&state)),
        headers.clone(),
        Json(SubmitSearchRequest {
            query: "second".to_string(),
        }),
    )
    .await;
    assert_eq!(second.unwrap_err().0, StatusCode::FORBIDDEN);

    // Empty query rejected regardless of user.
    let empty = handlers::submit_search(
        State(Arc::clone(&state)),
        HeaderMap::new(),
        Json(SubmitSearchRequest {
            query: "   ".to_string(),
        }),
    )
    .await;
    assert_eq!(empty.unwrap_err().0, StatusCode::BAD_REQUEST);

    cleanup_test_db(&db, &db_name).await?;
    Ok(())
}
