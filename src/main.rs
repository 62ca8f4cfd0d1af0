use std::sync::Arc;

use distill::api::{self, AppState};
use distill::config::CONFIG;
use distill::db::Database;
use distill::jobs::Jobs;
use distill::pipeline::Pipeline;
use distill::summarizer::Summarizer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(true)
        .init();

    Database::init_global().await?;
    let db = Database::get().clone();

    let summarizer = Arc::new(Summarizer::new());
    let pipeline = Arc::new(Pipeline::new(db.clone(), Arc::clone(&summarizer))?);
    let jobs = Arc::new(Jobs::new());

    let state = Arc::new(AppState {
        db,
        summarizer,
        pipeline,
        jobs,
    });

    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&CONFIG.bind_addr).await?;
    tracing::info!("listening on {}", CONFIG.bind_addr);
    axum::serve(listener, router).await?;

    Ok(())
}
