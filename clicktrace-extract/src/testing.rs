//! In-memory browser for exercising the pipeline without Chrome.
//!
//! A [`FakeDocument`] describes what a frame would report to each
//! extraction script. [`FakeLauncher`] serves a map of URL -> [`FakeSite`],
//! hands out pages that navigate within that map, and keeps counters so tests
//! can assert that every page and browser it handed out was closed.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use clicktrace_config::IdentityConfig;
use serde_json::{json, Value};
use url::Url;

use crate::handle::{BrowserHandle, BrowserLauncher, Closable, FrameHandle, PageHandle};
use crate::pattern::is_falsy;
use crate::scripts;

/// What one document answers to the extraction scripts.
#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    pub url: Option<String>,
    pub global: Option<Value>,
    pub local_storage: Option<String>,
    pub session_storage: Option<String>,
    pub scripts: Vec<String>,
    pub html: String,
    pub marker_element: Option<Value>,
    pub iframe_sources: Vec<String>,
    /// Frames embedded in this document, in reported order.
    pub frames: Vec<FakeDocument>,
    /// Global assigned after this many definedness polls.
    pub late_global: Option<(u32, Value)>,
    /// Every evaluation fails, as in a detached frame.
    pub broken: bool,
}

impl FakeDocument {
    pub fn at(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    pub fn with_global(mut self, value: impl Into<Value>) -> Self {
        self.global = Some(value.into());
        self
    }

    pub fn with_local_storage(mut self, value: &str) -> Self {
        self.local_storage = Some(value.to_string());
        self
    }

    pub fn with_session_storage(mut self, value: &str) -> Self {
        self.session_storage = Some(value.to_string());
        self
    }

    pub fn with_script(mut self, text: &str) -> Self {
        self.scripts.push(text.to_string());
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn with_marker_element(mut self, href: Option<&str>, text: &str, tag: &str) -> Self {
        self.marker_element = Some(json!({
            "value": href.unwrap_or("present"),
            "details": {
                "href": href,
                "text": text,
                "tag": tag,
                "htmlSnippet": format!("<{tag} class=\"clicktrackedAd_js\">{text}</{tag}>"),
            }
        }));
        self
    }

    pub fn with_iframe(mut self, src: &str) -> Self {
        self.iframe_sources.push(src.to_string());
        self
    }

    pub fn with_frame(mut self, frame: FakeDocument) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn with_late_global(mut self, after_polls: u32, value: impl Into<Value>) -> Self {
        self.late_global = Some((after_polls, value.into()));
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

/// Label of each script a fake frame was asked to run, in order.
pub type CallLog = Arc<Mutex<Vec<(String, &'static str)>>>;

#[derive(Debug, Clone)]
pub struct FakeFrame {
    doc: Arc<FakeDocument>,
    polls: Arc<AtomicU32>,
    calls: CallLog,
}

impl FakeFrame {
    pub fn new(doc: FakeDocument) -> Self {
        Self::with_log(doc, CallLog::default())
    }

    pub fn with_log(doc: FakeDocument, calls: CallLog) -> Self {
        Self {
            doc: Arc::new(doc),
            polls: Arc::new(AtomicU32::new(0)),
            calls,
        }
    }

    /// Script labels evaluated against this frame's document.
    pub fn calls(&self) -> Vec<&'static str> {
        let name = self.doc.url.clone().unwrap_or_default();
        self.calls
            .lock()
            .map(|log| {
                log.iter()
                    .filter(|(url, _)| *url == name)
                    .map(|(_, label)| *label)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn late_value(&self) -> Option<Value> {
        let (after, value) = self.doc.late_global.as_ref()?;
        (self.polls.load(Ordering::SeqCst) >= *after).then(|| value.clone())
    }

    fn global(&self) -> Option<Value> {
        self.doc.global.clone().or_else(|| self.late_value())
    }

    fn record(&self, label: &'static str) {
        if let Ok(mut log) = self.calls.lock() {
            log.push((self.doc.url.clone().unwrap_or_default(), label));
        }
    }
}

fn script_label(script: &str) -> Option<&'static str> {
    [
        (scripts::GLOBAL_LOOKUP, "global"),
        (scripts::STORAGE_LOOKUP, "storage"),
        (scripts::INLINE_SCRIPT_TEXT, "scripts"),
        (scripts::DOCUMENT_HTML, "html"),
        (scripts::STRUCTURAL_MARKER, "structural"),
        (scripts::MARKER_DEFINED, "defined"),
        (scripts::IFRAME_SOURCES, "iframes"),
    ]
    .into_iter()
    .find(|(known, _)| *known == script)
    .map(|(_, label)| label)
}

#[async_trait]
impl FrameHandle for FakeFrame {
    async fn evaluate(&self, script: &str, _args: Vec<Value>) -> Result<Value> {
        let label = script_label(script).ok_or_else(|| anyhow!("unexpected script"))?;
        self.record(label);
        if self.doc.broken {
            bail!("Execution context was destroyed");
        }

        let value = match label {
            "global" => self.global().filter(|v| !is_falsy(v)).unwrap_or(Value::Null),
            "storage" => self
                .doc
                .local_storage
                .iter()
                .chain(self.doc.session_storage.iter())
                .find(|v| !v.is_empty())
                .map(|v| json!(v))
                .unwrap_or(Value::Null),
            "scripts" => json!(self.doc.scripts.join("\n")),
            "html" => json!(self.doc.html),
            "structural" => self.doc.marker_element.clone().unwrap_or(Value::Null),
            "defined" => {
                self.polls.fetch_add(1, Ordering::SeqCst);
                json!(self.global().is_some())
            }
            "iframes" => json!(self.doc.iframe_sources),
            _ => unreachable!("labels come from script_label"),
        };
        Ok(value)
    }

    async fn url(&self) -> Result<Option<Url>> {
        Ok(self.doc.url.as_deref().and_then(|u| Url::parse(u).ok()))
    }
}

/// A page reachable by URL: its main document plus embedded frames.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    pub document: FakeDocument,
    pub frames: Vec<FakeDocument>,
    pub fail_navigation: bool,
}

impl FakeSite {
    pub fn new(document: FakeDocument) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    pub fn with_frame(mut self, frame: FakeDocument) -> Self {
        self.frames.push(frame);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_navigation = true;
        self
    }
}

/// Shared bookkeeping across every browser and page a launcher hands out.
#[derive(Debug, Default)]
pub struct FakeState {
    sites: HashMap<String, FakeSite>,
    calls: CallLog,
    pub launches: AtomicUsize,
    pub browsers_closed: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub identities_applied: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
}

impl FakeState {
    /// Pages opened but not yet closed.
    pub fn open_pages(&self) -> usize {
        self.pages_opened.load(Ordering::SeqCst) - self.pages_closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().map(|n| n.clone()).unwrap_or_default()
    }

    /// Script labels evaluated against the document served at `url`.
    pub fn calls_for(&self, url: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .map(|log| {
                log.iter()
                    .filter(|(u, _)| u == url)
                    .map(|(_, label)| *label)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct FakeLauncher {
    state: Arc<FakeState>,
    fail_launch: bool,
    navigation_delay: Option<Duration>,
}

impl FakeLauncher {
    pub fn new(sites: impl IntoIterator<Item = (&'static str, FakeSite)>) -> Self {
        let state = FakeState {
            sites: sites
                .into_iter()
                .map(|(url, site)| (url.to_string(), site))
                .collect(),
            ..FakeState::default()
        };
        Self {
            state: Arc::new(state),
            fail_launch: false,
            navigation_delay: None,
        }
    }

    /// A launcher whose browsers cannot reach any site.
    pub fn empty() -> Self {
        Self::new(Vec::<(&'static str, FakeSite)>::new())
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::empty()
        }
    }

    /// Every navigation sleeps this long before completing.
    pub fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = Some(delay);
        self
    }

    pub fn state(&self) -> Arc<FakeState> {
        self.state.clone()
    }

    /// A browser without going through `launch`, for orchestrator tests.
    pub fn browser(&self) -> FakeBrowser {
        FakeBrowser {
            state: self.state.clone(),
            navigation_delay: self.navigation_delay,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Browser = FakeBrowser;

    async fn launch(&self) -> Result<FakeBrowser> {
        if self.fail_launch {
            bail!("Failed to launch the browser process");
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(self.browser())
    }
}

#[derive(Debug, Clone)]
pub struct FakeBrowser {
    state: Arc<FakeState>,
    navigation_delay: Option<Duration>,
    closed: Arc<AtomicBool>,
}

impl FakeBrowser {
    pub fn state(&self) -> Arc<FakeState> {
        self.state.clone()
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    type Page = FakePage;

    async fn new_page(&self) -> Result<FakePage> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("browser has disconnected");
        }
        self.state.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            state: self.state.clone(),
            navigation_delay: self.navigation_delay,
            site: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Closable for FakeBrowser {
    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.browsers_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoadedSite {
    main: FakeFrame,
    /// Depth-first, parents before children, with each frame's depth.
    frames: Vec<(usize, FakeFrame)>,
    url: Url,
}

fn flatten_frames(
    docs: &[FakeDocument],
    depth: usize,
    calls: &CallLog,
    out: &mut Vec<(usize, FakeFrame)>,
) {
    for doc in docs {
        out.push((depth, FakeFrame::with_log(doc.clone(), calls.clone())));
        flatten_frames(&doc.frames, depth + 1, calls, out);
    }
}

#[derive(Debug, Clone)]
pub struct FakePage {
    state: Arc<FakeState>,
    navigation_delay: Option<Duration>,
    site: Arc<Mutex<Option<LoadedSite>>>,
    closed: Arc<AtomicBool>,
}

impl FakePage {
    fn loaded(&self) -> Option<LoadedSite> {
        self.site.lock().ok().and_then(|site| site.clone())
    }
}

#[async_trait]
impl PageHandle for FakePage {
    type Frame = FakeFrame;

    async fn apply_identity(&self, _identity: &IdentityConfig) -> Result<()> {
        self.state.identities_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn goto(&self, url: &Url, timeout: Duration) -> Result<()> {
        if let Ok(mut navigations) = self.state.navigations.lock() {
            navigations.push(url.to_string());
        }
        if let Some(delay) = self.navigation_delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                bail!("Navigation timeout of {} ms exceeded", timeout.as_millis());
            }
            tokio::time::sleep(delay).await;
        }

        let site = self
            .state
            .sites
            .get(url.as_str())
            .ok_or_else(|| anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"))?;
        if site.fail_navigation {
            bail!("net::ERR_CONNECTION_RESET at {url}");
        }

        let final_url = site
            .document
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .unwrap_or_else(|| url.clone());
        let mut frames = Vec::new();
        flatten_frames(&site.frames, 1, &self.state.calls, &mut frames);
        let loaded = LoadedSite {
            main: FakeFrame::with_log(site.document.clone(), self.state.calls.clone()),
            frames,
            url: final_url,
        };
        if let Ok(mut slot) = self.site.lock() {
            *slot = Some(loaded);
        }
        Ok(())
    }

    async fn url(&self) -> Result<Url> {
        match self.loaded() {
            Some(site) => Ok(site.url),
            None => Ok(Url::parse("about:blank")?),
        }
    }

    fn main_frame(&self) -> FakeFrame {
        self.loaded()
            .map(|site| site.main)
            .unwrap_or_else(|| FakeFrame::with_log(FakeDocument::default(), self.state.calls.clone()))
    }

    async fn child_frames(&self, max_depth: usize) -> Result<Vec<FakeFrame>> {
        let frames = self.loaded().map(|site| site.frames).unwrap_or_default();
        Ok(frames
            .into_iter()
            .filter(|(depth, _)| *depth <= max_depth)
            .map(|(_, frame)| frame)
            .collect())
    }
}

#[async_trait]
impl Closable for FakePage {
    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.pages_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
