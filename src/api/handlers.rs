use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tracing::info;

use crate::data_models::SearchRequest;
use crate::db::{ResultItemRepo, SearchRepo, UserRepo};
use crate::pipeline::CONFIDENCE_DISPLAY_THRESHOLD;
use crate::summarizer::UsageStats;

use super::AppState;
use super::models::{
    FetchSearchResponse, ResultItemView, SearchView, SubmitSearchRequest, SubmitSearchResponse,
};

type HandlerError = (StatusCode, String);

fn internal(e: impl std::fmt::Display) -> HandlerError {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {e}"))
}

/// Accepts a query, creates the search in `searching` state, enqueues the
/// pipeline run and returns immediately. The client polls the fetch endpoint
/// for completion.
pub async fn submit_search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SubmitSearchRequest>,
) -> Result<Json<SubmitSearchResponse>, HandlerError> {
    let query = request.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query cannot be empty".to_string()));
    }

    // Quota accounting when the caller identifies itself. Auth itself lives
    // with the external provider; this only enforces the subscription limit.
    if let Some(user_id) = headers.get("x-user-id") {
        let user_id = user_id
            .to_str()
            .ok()
            .and_then(|v| ObjectId::parse_str(v).ok())
            .ok_or((StatusCode::BAD_REQUEST, "Invalid user id".to_string()))?;

        let users = UserRepo::new(&state.db);
        let user = users
            .find_by_id(user_id)
            .await
            .map_err(internal)?
            .ok_or((StatusCode::NOT_FOUND, "Unknown user".to_string()))?;

        if user.over_quota() {
            return Err((
                StatusCode::FORBIDDEN,
                "Monthly search limit reached".to_string(),
            ));
        }
        users.increment_searches_used(user_id).await.map_err(internal)?;
    }

    let search = SearchRequest::new(query.clone());
    let search_id = search.id;
    SearchRepo::new(&state.db)
        .insert(&search)
        .await
        .map_err(internal)?;

    info!("search {} submitted for {:?}", search_id, query);

    let pipeline = Arc::clone(&state.pipeline);
    state.jobs.spawn(search_id, async move {
        pipeline.run(search_id, &query).await;
    });

    Ok(Json(SubmitSearchResponse {
        search_id: search_id.to_hex(),
        status: search.status,
    }))
}

/// Returns the search with its result items filtered to confidence above the
/// display threshold. Filtering is presentation-only; nothing is mutated or
/// deleted on read.
pub async fn fetch_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FetchSearchResponse>, HandlerError> {
    let not_found = || (StatusCode::NOT_FOUND, "Search not found".to_string());

    let search_id = ObjectId::parse_str(&id).map_err(|_| not_found())?;

    let search = SearchRepo::new(&state.db)
        .find_by_id(search_id)
        .await
        .map_err(internal)?
        .ok_or_else(not_found)?;

    let items = ResultItemRepo::new(&state.db)
        .find_by_search(search_id)
        .await
        .map_err(internal)?;

    let original_count = items.len();
    let results: Vec<ResultItemView> = items
        .into_iter()
        .filter(|item| {
            item.confidence
                .is_some_and(|c| c > CONFIDENCE_DISPLAY_THRESHOLD)
        })
        .map(ResultItemView::from)
        .collect();

    let search_view = SearchView::from_search(&search, results.len(), original_count);

    Ok(Json(FetchSearchResponse {
        search: search_view,
        results,
        searched_urls: search.searched_urls,
    }))
}

/// Snapshot of the summarization engine's counters, for operational use.
pub async fn usage_stats(State(state): State<Arc<AppState>>) -> Json<UsageStats> {
    Json(state.summarizer.stats())
}

pub async fn reset_usage_stats(State(state): State<Arc<AppState>>) -> Json<UsageStats> {
    state.summarizer.reset_stats();
    Json(state.summarizer.stats())
}
