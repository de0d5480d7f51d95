use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use clicktrace_extract::BrowserLauncher;
use tower_http::trace::TraceLayer;

use crate::scrape::{scrape, ScrapeState};

/// `GET /`
pub async fn health() -> &'static str {
    "OK"
}

pub fn create_router<L>(state: Arc<ScrapeState<L>>) -> Router
where
    L: BrowserLauncher + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/scrape", post(scrape::<L>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
