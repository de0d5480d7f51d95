use std::time::Duration;

use clicktrace_common::{ClicktraceError, Result};
use clicktrace_config::{ExtractionConfig, IdentityConfig};
use tracing::{debug, info, warn};
use url::Url;

use crate::frame::FrameExtractor;
use crate::handle::{BrowserHandle, FrameHandle, PageHandle};
use crate::scoped::Scoped;
use crate::scripts;
use crate::types::{ExtractionResult, Found, Source};

/// Drives a [`FrameExtractor`] across a navigated page, widening the search
/// only when the narrower scope came up empty:
///
/// 1. the main document,
/// 2. same-origin child frames in browser-reported order,
/// 3. every `iframe[src]`, each loaded in its own isolated page,
/// 4. one bounded wait for the marker global to be assigned late.
#[derive(Debug, Clone)]
pub struct PageOrchestrator {
    extractor: FrameExtractor,
    identity: IdentityConfig,
    navigation_timeout: Duration,
    async_wait: Duration,
    poll_interval: Duration,
    max_frame_depth: usize,
}

impl PageOrchestrator {
    pub fn new(extraction: &ExtractionConfig, identity: IdentityConfig) -> Result<Self> {
        let extractor = FrameExtractor::from_config(extraction)
            .map_err(|e| ClicktraceError::Config(format!("invalid marker pattern: {e}")))?;
        Ok(Self {
            extractor,
            identity,
            navigation_timeout: extraction.navigation_timeout(),
            async_wait: extraction.async_wait(),
            poll_interval: extraction.poll_interval(),
            max_frame_depth: extraction.max_frame_depth,
        })
    }

    /// Apply the browser identity, then load `url`. Identity failures only
    /// warn; navigation failures are fatal for the page.
    pub async fn navigate<P: PageHandle>(&self, page: &P, url: &Url) -> Result<()> {
        if let Err(err) = page.apply_identity(&self.identity).await {
            warn!(target: "extract.page", %url, error = %err, "could not apply browser identity");
        }
        page.goto(url, self.navigation_timeout)
            .await
            .map_err(|err| ClicktraceError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    /// Search an already navigated `page`. Never fails: anything that goes
    /// wrong below the page level counts as absence.
    pub async fn run<B: BrowserHandle>(&self, browser: &B, page: &B::Page) -> ExtractionResult {
        let main = page.main_frame();
        if let Some(found) = self.extractor.extract(&main).await {
            info!(target: "extract.page", strategy = %found.strategy, "found in main document");
            return ExtractionResult::from_found(found, Source::MainDocument);
        }

        let base = match page.url().await {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(target: "extract.page", error = %err, "page url unavailable; skipping frame search");
                None
            }
        };

        if let Some(base) = &base {
            if let Some(result) = self.search_same_origin_frames(page, base).await {
                return result;
            }
            if let Some(result) = self.search_isolated(browser, &main, base).await {
                return result;
            }
        }

        self.await_late_assignment(&main).await
    }

    async fn search_same_origin_frames<P: PageHandle>(
        &self,
        page: &P,
        base: &Url,
    ) -> Option<ExtractionResult> {
        let origin = base.origin();
        if !origin.is_tuple() {
            return None;
        }
        let frames = match page.child_frames(self.max_frame_depth).await {
            Ok(frames) => frames,
            Err(err) => {
                debug!(target: "extract.page", error = %err, "frame enumeration failed");
                return None;
            }
        };

        for frame in &frames {
            let url = match frame.url().await {
                Ok(Some(url)) => url,
                Ok(None) => continue,
                Err(err) => {
                    debug!(target: "extract.page", error = %err, "frame url unavailable");
                    continue;
                }
            };
            if url.origin() != origin {
                debug!(target: "extract.page", %url, "skipping cross-origin frame");
                continue;
            }
            if let Some(found) = self.extractor.extract(frame).await {
                info!(target: "extract.page", %url, strategy = %found.strategy, "found in same-origin frame");
                return Some(ExtractionResult::from_found(found, Source::SameOriginFrame(url)));
            }
        }
        None
    }

    async fn search_isolated<B: BrowserHandle>(
        &self,
        browser: &B,
        main: &<B::Page as PageHandle>::Frame,
        base: &Url,
    ) -> Option<ExtractionResult> {
        for target in self.iframe_targets(main, base).await {
            if let Some(found) = self.probe_isolated(browser, &target).await {
                info!(target: "extract.page", url = %target, strategy = %found.strategy, "found in isolated probe");
                return Some(ExtractionResult::from_found(found, Source::IsolatedProbe(target)));
            }
        }
        None
    }

    /// Absolute http(s) URLs of the main document's iframes, in document order.
    async fn iframe_targets<F: FrameHandle>(&self, main: &F, base: &Url) -> Vec<Url> {
        let raw = match main.evaluate(scripts::IFRAME_SOURCES, vec![]).await {
            Ok(value) => value,
            Err(err) => {
                debug!(target: "extract.page", error = %err, "iframe enumeration failed");
                return Vec::new();
            }
        };
        let sources: Vec<String> = serde_json::from_value(raw).unwrap_or_default();
        sources
            .iter()
            .filter_map(|src| match base.join(src.trim()) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
                Ok(url) => {
                    debug!(target: "extract.page", %url, "skipping non-http iframe");
                    None
                }
                Err(err) => {
                    debug!(target: "extract.page", src = %src, error = %err, "unresolvable iframe src");
                    None
                }
            })
            .collect()
    }

    /// Load `target` in a fresh page and search its main document. The page
    /// is closed before returning, or by its guard if this future is dropped.
    async fn probe_isolated<B: BrowserHandle>(&self, browser: &B, target: &Url) -> Option<Found> {
        let page = match browser.new_page().await {
            Ok(page) => Scoped::new(page),
            Err(err) => {
                warn!(target: "extract.page", url = %target, error = %err, "could not open isolated page");
                return None;
            }
        };

        let found = match self.navigate(&*page, target).await {
            Ok(()) => self.extractor.extract(&page.main_frame()).await,
            Err(err) => {
                debug!(target: "extract.page", error = %err, "isolated probe failed");
                None
            }
        };

        if let Err(err) = page.close().await {
            warn!(target: "extract.page", url = %target, error = %err, "failed to close isolated page");
        }
        found
    }

    /// Poll until the marker global is defined or the wait elapses, then read it.
    async fn await_late_assignment<F: FrameHandle>(&self, main: &F) -> ExtractionResult {
        if self.async_wait.is_zero() {
            return ExtractionResult::absent();
        }

        let defined = tokio::time::timeout(self.async_wait, async {
            loop {
                match self.extractor.is_global_defined(main).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(err) => debug!(target: "extract.page", error = %err, "definedness poll failed"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
        .await;

        if defined.is_err() {
            debug!(target: "extract.page", wait = ?self.async_wait, "marker never assigned");
            return ExtractionResult::absent();
        }

        match self.extractor.read_global(main).await {
            Ok(Some(value)) => {
                info!(target: "extract.page", "found after late assignment");
                ExtractionResult {
                    value: Some(value),
                    details: None,
                    source: Some(Source::AsyncAssignment),
                    strategy: None,
                }
            }
            Ok(None) => ExtractionResult::absent(),
            Err(err) => {
                debug!(target: "extract.page", error = %err, "late global read failed");
                ExtractionResult::absent()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Closable;
    use crate::strategy::Strategy;
    use crate::testing::{FakeDocument, FakeLauncher, FakeSite};

    fn orchestrator(async_wait_secs: u64) -> PageOrchestrator {
        let cfg = ExtractionConfig {
            async_wait_secs,
            ..ExtractionConfig::default()
        };
        PageOrchestrator::new(&cfg, IdentityConfig::default()).unwrap()
    }

    fn with_frame_depth(max_frame_depth: usize) -> PageOrchestrator {
        let cfg = ExtractionConfig {
            async_wait_secs: 0,
            max_frame_depth,
            ..ExtractionConfig::default()
        };
        PageOrchestrator::new(&cfg, IdentityConfig::default()).unwrap()
    }

    fn nested_site() -> FakeLauncher {
        FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/"))
                .with_frame(
                    FakeDocument::at("https://site.test/outer")
                        .with_frame(FakeDocument::at("https://site.test/inner").with_global("deep")),
                )
                .with_frame(FakeDocument::at("https://site.test/sibling").with_global("shallow")),
        )])
    }

    async fn search(launcher: &FakeLauncher, url: &str, orch: &PageOrchestrator) -> ExtractionResult {
        let browser = launcher.browser();
        let page = browser.new_page().await.unwrap();
        orch.navigate(&page, &Url::parse(url).unwrap()).await.unwrap();
        let result = orch.run(&browser, &page).await;
        page.close().await.unwrap();
        result
    }

    #[tokio::test]
    async fn main_document_short_circuits_frames() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/").with_global("top"))
                .with_frame(FakeDocument::at("https://site.test/frame").with_global("inner")),
        )]);

        let result = search(&launcher, "https://site.test/", &orchestrator(0)).await;
        assert_eq!(result.value.as_deref(), Some("top"));
        assert_eq!(result.source, Some(Source::MainDocument));
        assert!(launcher.state().calls_for("https://site.test/frame").is_empty());
    }

    #[tokio::test]
    async fn identity_is_applied_before_navigation() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/").with_global("x")),
        )]);

        search(&launcher, "https://site.test/", &orchestrator(0)).await;
        let state = launcher.state();
        assert_eq!(state.identities_applied.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cross_origin_child_frames_are_not_evaluated_in_place() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/"))
                .with_frame(FakeDocument::at("https://ads.test/slot").with_global("foreign")),
        )]);

        let result = search(&launcher, "https://site.test/", &orchestrator(0)).await;
        assert_eq!(result.value, None);
        assert!(launcher.state().calls_for("https://ads.test/slot").is_empty());
    }

    #[tokio::test]
    async fn probe_result_carries_structural_details() {
        let launcher = FakeLauncher::new([
            (
                "https://site.test/",
                FakeSite::new(FakeDocument::at("https://site.test/").with_iframe("https://ads.test/unit")),
            ),
            (
                "https://ads.test/unit",
                FakeSite::new(FakeDocument::at("https://ads.test/unit").with_marker_element(
                    Some("https://ads.test/click"),
                    "Ad",
                    "a",
                )),
            ),
        ]);

        let result = search(&launcher, "https://site.test/", &orchestrator(0)).await;
        assert_eq!(result.value.as_deref(), Some("https://ads.test/click"));
        assert_eq!(result.strategy, Some(Strategy::StructuralMarker));
        assert_eq!(result.details.unwrap().tag, "a");
        assert_eq!(launcher.state().open_pages(), 0);
    }

    #[tokio::test]
    async fn non_http_iframe_sources_are_skipped() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(
                FakeDocument::at("https://site.test/")
                    .with_iframe("about:blank")
                    .with_iframe("javascript:void(0)"),
            ),
        )]);

        let result = search(&launcher, "https://site.test/", &orchestrator(0)).await;
        assert_eq!(result.value, None);
        assert_eq!(launcher.state().navigations(), vec!["https://site.test/"]);
    }

    #[tokio::test]
    async fn zero_async_wait_skips_polling() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/").with_late_global(1, "late")),
        )]);

        let result = search(&launcher, "https://site.test/", &orchestrator(0)).await;
        assert_eq!(result.value, None);
        assert!(!launcher.state().calls_for("https://site.test/").contains(&"defined"));
    }

    #[tokio::test]
    async fn nested_frames_are_searched_depth_first() {
        let launcher = nested_site();

        let result = search(&launcher, "https://site.test/", &with_frame_depth(4)).await;
        assert_eq!(result.value.as_deref(), Some("deep"));
        assert_eq!(
            result.source,
            Some(Source::SameOriginFrame(Url::parse("https://site.test/inner").unwrap()))
        );
        assert!(launcher.state().calls_for("https://site.test/sibling").is_empty());
    }

    #[tokio::test]
    async fn frame_depth_bounds_the_walk() {
        let launcher = nested_site();

        let result = search(&launcher, "https://site.test/", &with_frame_depth(1)).await;
        assert_eq!(result.value.as_deref(), Some("shallow"));
        assert!(launcher.state().calls_for("https://site.test/inner").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn falsy_late_assignment_is_absent() {
        let launcher = FakeLauncher::new([(
            "https://site.test/",
            FakeSite::new(FakeDocument::at("https://site.test/").with_late_global(1, 0)),
        )]);

        let result = search(&launcher, "https://site.test/", &orchestrator(10)).await;
        assert_eq!(result.value, None);
        assert_eq!(result.source, None);
        assert!(launcher.state().calls_for("https://site.test/").contains(&"defined"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_probe_still_closes_its_page() {
        let launcher = FakeLauncher::new([
            (
                "https://site.test/",
                FakeSite::new(FakeDocument::at("https://site.test/").with_iframe("https://ads.test/slow")),
            ),
            (
                "https://ads.test/slow",
                FakeSite::new(FakeDocument::at("https://ads.test/slow").with_global("late")),
            ),
        ])
        .with_navigation_delay(Duration::from_secs(5));
        let orch = orchestrator(0);
        let browser = launcher.browser();
        let page = browser.new_page().await.unwrap();
        orch.navigate(&page, &Url::parse("https://site.test/").unwrap()).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(1), orch.run(&browser, &page)).await;
        assert!(outcome.is_err());
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        let state = launcher.state();
        assert_eq!(state.pages_opened.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(state.open_pages(), 1);
        page.close().await.unwrap();
        assert_eq!(state.open_pages(), 0);
    }

    #[test]
    fn marker_metacharacters_are_escaped() {
        let cfg = ExtractionConfig {
            marker: "a(b".into(),
            ..ExtractionConfig::default()
        };
        assert!(PageOrchestrator::new(&cfg, IdentityConfig::default()).is_ok());
    }
}
