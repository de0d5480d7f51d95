use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clicktrace_config::IdentityConfig;
use clicktrace_extract::{Closable, PageHandle};
use fantoccini::wd::WindowHandle;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::clicktrace_browser::browser::Session;
use crate::clicktrace_browser::cdp;
use crate::clicktrace_browser::frame::WebDriverFrame;
use crate::clicktrace_browser::identity::{extra_headers, user_agent_override};

const FRAME_COUNT: &str = "return window.frames.length;";

/// A WebDriver window. Every operation activates the window first.
#[derive(Clone)]
pub struct WebDriverPage {
    session: Arc<Session>,
    window: WindowHandle,
    closed: Arc<AtomicBool>,
}

impl WebDriverPage {
    pub(crate) fn new(session: Arc<Session>, window: WindowHandle) -> Self {
        Self {
            session,
            window,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn activate(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("page has been closed");
        }
        self.session
            .client
            .switch_to_window(self.window.clone())
            .await
            .context("failed to switch to page window")
    }

    async fn frame_count(&self, path: &[u16]) -> usize {
        let frame = WebDriverFrame::new(self.session.clone(), self.window.clone(), path.to_vec());
        match frame.execute(FRAME_COUNT, vec![]).await {
            Ok(count) => count.as_u64().unwrap_or(0) as usize,
            Err(err) => {
                debug!(target: "browser.webdriver", ?path, error = %err, "could not count frames");
                0
            }
        }
    }
}

#[async_trait]
impl PageHandle for WebDriverPage {
    type Frame = WebDriverFrame;

    async fn apply_identity(&self, identity: &IdentityConfig) -> Result<()> {
        let _guard = self.session.lock.lock().await;
        self.activate().await?;
        let client = &self.session.client;
        cdp::execute(client, "Network.enable", json!({})).await?;
        cdp::execute(client, "Network.setUserAgentOverride", user_agent_override(identity)).await?;
        cdp::execute(client, "Network.setExtraHTTPHeaders", extra_headers(identity)).await?;
        Ok(())
    }

    async fn goto(&self, url: &Url, timeout: Duration) -> Result<()> {
        let _guard = self.session.lock.lock().await;
        self.activate().await?;
        info!(target: "browser.webdriver", %url, "navigating");
        match tokio::time::timeout(timeout, self.session.client.goto(url.as_str())).await {
            Ok(result) => result.with_context(|| format!("failed to load {url}")),
            Err(_) => bail!("Navigation timeout of {} ms exceeded", timeout.as_millis()),
        }
    }

    async fn url(&self) -> Result<Url> {
        let _guard = self.session.lock.lock().await;
        self.activate().await?;
        Ok(self.session.client.current_url().await?)
    }

    fn main_frame(&self) -> WebDriverFrame {
        WebDriverFrame::new(self.session.clone(), self.window.clone(), Vec::new())
    }

    async fn child_frames(&self, max_depth: usize) -> Result<Vec<WebDriverFrame>> {
        let paths = frame_paths(max_depth, |path| async move { self.frame_count(&path).await }).await;
        debug!(target: "browser.webdriver", count = paths.len(), "enumerated frames");
        Ok(paths
            .into_iter()
            .map(|path| WebDriverFrame::new(self.session.clone(), self.window.clone(), path))
            .collect())
    }
}

#[async_trait]
impl Closable for WebDriverPage {
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.session.lock.lock().await;
        let client = &self.session.client;
        client
            .switch_to_window(self.window.clone())
            .await
            .context("failed to switch to page window")?;
        client
            .close_window()
            .await
            .context("failed to close page window")
    }
}

/// Index paths of every frame below the top document, depth-first with
/// parents before children and siblings in index order, at most `max_depth`
/// levels down. `count` reports how many child frames a path has.
async fn frame_paths<F, Fut>(max_depth: usize, mut count: F) -> Vec<Vec<u16>>
where
    F: FnMut(Vec<u16>) -> Fut,
    Fut: Future<Output = usize>,
{
    let mut found = Vec::new();
    let mut pending: Vec<Vec<u16>> = vec![Vec::new()];
    while let Some(path) = pending.pop() {
        if path.len() < max_depth {
            let children = count(path.clone()).await;
            for index in (0..children).rev() {
                let Ok(index) = u16::try_from(index) else {
                    continue;
                };
                let mut child = path.clone();
                child.push(index);
                pending.push(child);
            }
        }
        if !path.is_empty() {
            found.push(path);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Top document with two frames; the first nests two more levels.
    async fn tree(path: Vec<u16>) -> usize {
        match path.as_slice() {
            [] => 2,
            [0] => 1,
            [0, 0] => 1,
            _ => 0,
        }
    }

    #[tokio::test]
    async fn frames_are_walked_depth_first() {
        let paths = frame_paths(4, tree).await;
        assert_eq!(paths, vec![vec![0], vec![0, 0], vec![0, 0, 0], vec![1]]);
    }

    #[tokio::test]
    async fn walk_stops_at_max_depth() {
        assert_eq!(frame_paths(2, tree).await, vec![vec![0], vec![0, 0], vec![1]]);
        assert_eq!(frame_paths(1, tree).await, vec![vec![0], vec![1]]);
        assert!(frame_paths(0, tree).await.is_empty());
    }

    #[tokio::test]
    async fn leaves_are_not_counted() {
        let mut asked = Vec::new();
        frame_paths(1, |path| {
            asked.push(path);
            async { 3 }
        })
        .await;
        assert_eq!(asked, vec![Vec::<u16>::new()]);
    }
}
