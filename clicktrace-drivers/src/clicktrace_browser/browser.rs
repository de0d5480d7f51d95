use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clicktrace_extract::{BrowserHandle, Closable};
use fantoccini::wd::WindowHandle;
use fantoccini::Client;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clicktrace_browser::page::WebDriverPage;

/// One WebDriver session shared by every page of a browser.
///
/// WebDriver commands act on the session's current window and frame, so each
/// page operation holds `lock` from its window switch until it is done.
pub struct Session {
    pub(crate) client: Client,
    pub(crate) lock: Mutex<()>,
}

impl Session {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            lock: Mutex::new(()),
        }
    }
}

/// A browser owned by one request. Pages are WebDriver windows of its session.
/// Clones share the session.
#[derive(Clone)]
pub struct WebDriverBrowser {
    session: Arc<Session>,
    /// Window created with the session, handed to the first page.
    initial_window: Arc<Mutex<Option<WindowHandle>>>,
    closed: Arc<AtomicBool>,
}

impl WebDriverBrowser {
    pub async fn new(client: Client) -> Result<Self> {
        let initial = client
            .window()
            .await
            .context("failed to read the session's initial window")?;
        Ok(Self {
            session: Arc::new(Session::new(client)),
            initial_window: Arc::new(Mutex::new(Some(initial))),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl BrowserHandle for WebDriverBrowser {
    type Page = WebDriverPage;

    async fn new_page(&self) -> Result<WebDriverPage> {
        if let Some(window) = self.initial_window.lock().await.take() {
            return Ok(WebDriverPage::new(self.session.clone(), window));
        }

        let _guard = self.session.lock.lock().await;
        let created = self
            .session
            .client
            .new_window(true)
            .await
            .context("failed to open a new tab")?;
        debug!(target: "browser.webdriver", window = ?created.handle, "opened tab");
        Ok(WebDriverPage::new(self.session.clone(), created.handle))
    }
}

#[async_trait]
impl Closable for WebDriverBrowser {
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _guard = self.session.lock.lock().await;
        if let Err(err) = self.session.client.clone().close().await {
            warn!(target: "browser.webdriver", error = %err, "session did not close cleanly");
            return Err(err.into());
        }
        debug!(target: "browser.webdriver", "session closed");
        Ok(())
    }
}
