//! Request-level failures and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clicktrace_common::ClicktraceError;
use serde_json::json;
use thiserror::Error;

pub const MISSING_URL: &str = "Missing 'url' in body";

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Body absent, not JSON, or with an absent or falsy `url`.
    #[error("Missing 'url' in body")]
    MissingUrl,

    /// Launch, top-level navigation (including an unusable `url`) or driver failure.
    #[error(transparent)]
    Failed(#[from] ClicktraceError),
}

impl ScrapeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ScrapeError::MissingUrl => StatusCode::BAD_REQUEST,
            ScrapeError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
