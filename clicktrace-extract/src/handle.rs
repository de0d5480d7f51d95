//! Browser capabilities the extraction pipeline consumes.
//!
//! The pipeline never talks to a browser directly; it drives these traits,
//! which `clicktrace-drivers` implements over a WebDriver session and the
//! `testing` module implements in memory.
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clicktrace_config::IdentityConfig;
use serde_json::Value;
use url::Url;

/// One renderable document context: a page's main document or an embedded frame.
#[async_trait]
pub trait FrameHandle: Send + Sync {
    /// Run `script` as a function body in this frame, with `args` bound to
    /// `arguments`, and return its JSON result.
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value>;

    /// The frame's resolved document URL, `None` when it has none.
    async fn url(&self) -> Result<Option<Url>>;
}

/// A browser resource that must be released once its owner is done with it.
///
/// Handles are cheap clones of one underlying resource, so a [`Scoped`]
/// owner can release it from `Drop`. `close` is idempotent across clones.
///
/// [`Scoped`]: crate::scoped::Scoped
#[async_trait]
pub trait Closable: Clone + Send + Sync + 'static {
    async fn close(&self) -> Result<()>;
}

/// A navigable page (browser tab) and its frame tree.
#[async_trait]
pub trait PageHandle: Closable {
    type Frame: FrameHandle;

    /// Set the outgoing user agent and fixed request headers for this page.
    async fn apply_identity(&self, identity: &IdentityConfig) -> Result<()>;

    /// Navigate and wait for DOM ready, failing after `timeout`.
    async fn goto(&self, url: &Url, timeout: Duration) -> Result<()>;

    /// Current URL of the top-level document.
    async fn url(&self) -> Result<Url>;

    fn main_frame(&self) -> Self::Frame;

    /// Every embedded frame below the main document in browser-reported
    /// order, descending at most `max_depth` levels.
    async fn child_frames(&self, max_depth: usize) -> Result<Vec<Self::Frame>>;
}

/// A running browser owned by a single request.
#[async_trait]
pub trait BrowserHandle: Closable {
    type Page: PageHandle;

    async fn new_page(&self) -> Result<Self::Page>;
}

/// Produces a controllable browser. Implementations differ only in how the
/// browser binary is located and started.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Browser: BrowserHandle;

    async fn launch(&self) -> Result<Self::Browser>;
}

#[async_trait]
impl<L: BrowserLauncher + ?Sized> BrowserLauncher for Box<L> {
    type Browser = L::Browser;

    async fn launch(&self) -> Result<Self::Browser> {
        (**self).launch().await
    }
}
