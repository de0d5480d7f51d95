use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use clicktrace_common::ClicktraceError;
use clicktrace_extract::pattern::is_falsy;
use clicktrace_extract::{
    BrowserHandle, BrowserLauncher, DetailRecord, ExtractionResult, PageHandle, PageOrchestrator,
    Scoped,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::error::ScrapeError;

/// Shared by every request: how to get a browser and how to search a page.
pub struct ScrapeState<L> {
    pub launcher: L,
    pub orchestrator: PageOrchestrator,
}

impl<L> ScrapeState<L> {
    pub fn new(launcher: L, orchestrator: PageOrchestrator) -> Self {
        Self {
            launcher,
            orchestrator,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub url: Option<Value>,
}

impl ScrapeRequest {
    /// Only an absent or falsy `url` is an input error. Any other value that is
    /// not an absolute URL fails the way a navigation to it would.
    pub fn target(body: &[u8]) -> Result<(String, Url), ScrapeError> {
        let value = serde_json::from_slice::<ScrapeRequest>(body)
            .ok()
            .and_then(|req| req.url)
            .filter(|url| !is_falsy(url))
            .ok_or(ScrapeError::MissingUrl)?;
        let raw = match value {
            Value::String(url) => url,
            other => other.to_string(),
        };
        let parsed = Url::parse(raw.trim()).map_err(|e| ClicktraceError::Navigation {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        Ok((raw, parsed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrapeResponse {
    pub url: String,
    #[serde(rename = "clicktrackedAd_js")]
    pub value: Option<String>,
    #[serde(rename = "finalUrl")]
    pub final_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<DetailRecord>,
}

/// `POST /scrape`
pub async fn scrape<L>(
    State(state): State<Arc<ScrapeState<L>>>,
    body: Bytes,
) -> Result<Json<ScrapeResponse>, ScrapeError>
where
    L: BrowserLauncher + 'static,
{
    let (raw, target) = ScrapeRequest::target(&body).inspect_err(|err| {
        warn!(target: "server.scrape", error = %err, "rejected scrape request");
    })?;
    let request_id = Uuid::new_v4();
    let span = info_span!(target: "server.scrape", "scrape", %request_id, url = %target);

    async move {
        let (result, final_url) = run(&*state, &target).await?;
        info!(
            target: "server.scrape",
            found = result.is_found(),
            strategy = ?result.strategy,
            final_url = %final_url,
            "scrape finished"
        );
        Ok(Json(ScrapeResponse {
            url: raw,
            value: result.value,
            final_url: final_url.to_string(),
            details: result.details,
        }))
    }
    .instrument(span)
    .await
}

/// Launch, search, and always close the browser.
async fn run<L: BrowserLauncher>(
    state: &ScrapeState<L>,
    target: &Url,
) -> Result<(ExtractionResult, Url), ScrapeError> {
    let browser = state
        .launcher
        .launch()
        .await
        .map(Scoped::new)
        .map_err(|e| ClicktraceError::Launch(format!("{e:#}")))?;

    let outcome = search(&state.orchestrator, &*browser, target).await;

    if let Err(err) = browser.close().await {
        warn!(target: "server.scrape", error = %err, "browser did not close cleanly");
    }
    Ok(outcome?)
}

async fn search<B: BrowserHandle>(
    orchestrator: &PageOrchestrator,
    browser: &B,
    target: &Url,
) -> Result<(ExtractionResult, Url), ClicktraceError> {
    let page = browser.new_page().await?;
    orchestrator.navigate(&page, target).await?;
    let result = orchestrator.run(browser, &page).await;
    let final_url = match page.url().await {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "server.scrape", error = %err, "final url unavailable");
            target.clone()
        }
    };
    Ok((result, final_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_requires_a_url() {
        let bodies: [&[u8]; 7] = [
            b"",
            b"not json",
            b"{}",
            br#"{"url": null}"#,
            br#"{"url": ""}"#,
            br#"{"url": 0}"#,
            br#"{"url": false}"#,
        ];
        for body in bodies {
            assert!(
                matches!(ScrapeRequest::target(body), Err(ScrapeError::MissingUrl)),
                "{}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn unusable_url_is_a_navigation_failure() {
        let bodies: [&[u8]; 3] = [
            br#"{"url": "/relative"}"#,
            br#"{"url": "   "}"#,
            br#"{"url": 42}"#,
        ];
        for body in bodies {
            let err = ScrapeRequest::target(body).unwrap_err();
            assert!(
                matches!(err, ScrapeError::Failed(ClicktraceError::Navigation { .. })),
                "{err:?}"
            );
            assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn target_keeps_the_raw_url() {
        let (raw, parsed) = ScrapeRequest::target(br#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(raw, "https://example.com");
        assert_eq!(parsed.as_str(), "https://example.com/");
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let response = ScrapeResponse {
            url: "https://example.com/has-marker".into(),
            value: None,
            final_url: "https://example.com/has-marker".into(),
            details: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "url": "https://example.com/has-marker",
                "clicktrackedAd_js": null,
                "finalUrl": "https://example.com/has-marker",
            })
        );
    }
}
