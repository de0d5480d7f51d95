use anyhow::Result;
use clicktrace_config::ExtractionConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::handle::FrameHandle;
use crate::pattern::{coerce_value, AssignmentPattern};
use crate::scripts;
use crate::strategy::Strategy;
use crate::types::{DetailRecord, Found};

/// Runs the ordered strategy chain against a single frame.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    marker: String,
    pattern: AssignmentPattern,
    strategies: Vec<Strategy>,
    text_limit: usize,
    html_limit: usize,
}

#[derive(Debug, Deserialize)]
struct MarkerElement {
    value: String,
    details: DetailRecord,
}

impl FrameExtractor {
    /// Extractor for `marker` with the full strategy chain and default limits.
    pub fn new(marker: impl Into<String>) -> Result<Self, regex::Error> {
        Self::from_config(&ExtractionConfig {
            marker: marker.into(),
            ..ExtractionConfig::default()
        })
    }

    pub fn from_config(cfg: &ExtractionConfig) -> Result<Self, regex::Error> {
        let marker = cfg.marker.trim().to_string();
        let strategies = if cfg.structural_markers {
            Strategy::ORDERED.to_vec()
        } else {
            Strategy::LITERAL_ONLY.to_vec()
        };
        Ok(Self {
            pattern: AssignmentPattern::new(&marker)?,
            marker,
            strategies,
            text_limit: cfg.detail_text_limit,
            html_limit: cfg.detail_html_limit,
        })
    }

    /// First value any strategy finds, in chain order. Strategy failures are
    /// logged and count as absence.
    pub async fn extract<F: FrameHandle + ?Sized>(&self, frame: &F) -> Option<Found> {
        for &strategy in &self.strategies {
            match self.run(strategy, frame).await {
                Ok(Some(found)) => {
                    debug!(target: "extract.frame", %strategy, "marker found");
                    return Some(found);
                }
                Ok(None) => trace!(target: "extract.frame", %strategy, "no match"),
                Err(err) => debug!(
                    target: "extract.frame",
                    %strategy,
                    error = %err,
                    "strategy failed; treating as absent"
                ),
            }
        }
        None
    }

    /// Run one strategy. Errors are returned as-is for the caller to swallow.
    pub async fn run<F: FrameHandle + ?Sized>(
        &self,
        strategy: Strategy,
        frame: &F,
    ) -> Result<Option<Found>> {
        let literal = match strategy {
            Strategy::GlobalVariable => self.read_global(frame).await?,
            Strategy::Storage => {
                coerce_value(frame.evaluate(scripts::STORAGE_LOOKUP, self.args()).await?)
            }
            Strategy::InlineScripts => {
                let text = frame.evaluate(scripts::INLINE_SCRIPT_TEXT, vec![]).await?;
                self.pattern.find(text.as_str().unwrap_or_default())
            }
            Strategy::DocumentHtml => {
                let html = frame.evaluate(scripts::DOCUMENT_HTML, vec![]).await?;
                self.pattern.find(html.as_str().unwrap_or_default())
            }
            Strategy::StructuralMarker => return self.structural_marker(frame).await,
        };
        Ok(literal.map(|value| Found::literal(value, strategy)))
    }

    /// Current value of the marker global, if defined and truthy.
    pub async fn read_global<F: FrameHandle + ?Sized>(&self, frame: &F) -> Result<Option<String>> {
        let value = frame.evaluate(scripts::GLOBAL_LOOKUP, self.args()).await?;
        Ok(coerce_value(value))
    }

    pub async fn is_global_defined<F: FrameHandle + ?Sized>(&self, frame: &F) -> Result<bool> {
        let value = frame.evaluate(scripts::MARKER_DEFINED, self.args()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn structural_marker<F: FrameHandle + ?Sized>(&self, frame: &F) -> Result<Option<Found>> {
        let args = vec![
            json!(self.marker),
            json!(self.text_limit),
            json!(self.html_limit),
        ];
        let raw = frame.evaluate(scripts::STRUCTURAL_MARKER, args).await?;
        if raw.is_null() {
            return Ok(None);
        }
        let element: MarkerElement = serde_json::from_value(raw)?;
        let value = if element.value.is_empty() {
            "present".to_string()
        } else {
            element.value
        };
        Ok(Some(Found {
            value,
            strategy: Strategy::StructuralMarker,
            details: Some(element.details.truncated(self.text_limit, self.html_limit)),
        }))
    }

    fn args(&self) -> Vec<Value> {
        vec![json!(self.marker)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDocument, FakeFrame};

    const PAGE: &str = "https://example.com/article";

    fn extractor() -> FrameExtractor {
        FrameExtractor::new("clicktrackedAd_js").unwrap()
    }

    #[tokio::test]
    async fn global_variable_wins_over_storage() {
        let frame = FakeFrame::new(
            FakeDocument::at(PAGE)
                .with_global("from-global")
                .with_local_storage("from-storage"),
        );

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "from-global");
        assert_eq!(found.strategy, Strategy::GlobalVariable);
        assert_eq!(frame.calls(), vec!["global"]);
    }

    #[tokio::test]
    async fn storage_falls_back_to_session() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_session_storage("sess-1"));

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "sess-1");
        assert_eq!(found.strategy, Strategy::Storage);
        assert_eq!(frame.calls(), vec!["global", "storage"]);
    }

    #[tokio::test]
    async fn inline_scripts_are_scanned_before_document() {
        let frame = FakeFrame::new(
            FakeDocument::at(PAGE)
                .with_script("var x = 1;")
                .with_script(r#"window.clicktrackedAd_js = "inline-7";"#)
                .with_html(r#"<div data-x='clicktrackedAd_js="html-9"'></div>"#),
        );

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "inline-7");
        assert_eq!(found.strategy, Strategy::InlineScripts);
        assert_eq!(frame.calls(), vec!["global", "storage", "scripts"]);
    }

    #[tokio::test]
    async fn document_html_covers_server_templated_values() {
        let frame = FakeFrame::new(
            FakeDocument::at(PAGE).with_html(r#"<meta content="clicktrackedAd_js: 'tmpl-3'">"#),
        );

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "tmpl-3");
        assert_eq!(found.strategy, Strategy::DocumentHtml);
        assert!(!frame.calls().contains(&"structural"));
    }

    #[tokio::test]
    async fn structural_marker_yields_href_and_details() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_marker_element(
            Some("https://ads.example/click?id=5"),
            "Sponsored",
            "div",
        ));

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "https://ads.example/click?id=5");
        assert_eq!(found.strategy, Strategy::StructuralMarker);
        let details = found.details.unwrap();
        assert_eq!(details.tag, "div");
        assert_eq!(details.text, "Sponsored");
        assert_eq!(details.href.as_deref(), Some("https://ads.example/click?id=5"));
    }

    #[tokio::test]
    async fn structural_marker_without_anchor_is_present() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_marker_element(None, "", "span"));

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "present");
        assert_eq!(found.details.unwrap().href, None);
    }

    #[tokio::test]
    async fn structural_markers_can_be_disabled() {
        let cfg = ExtractionConfig {
            structural_markers: false,
            ..ExtractionConfig::default()
        };
        let extractor = FrameExtractor::from_config(&cfg).unwrap();
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_marker_element(None, "", "span"));

        assert_eq!(extractor.extract(&frame).await, None);
        assert_eq!(frame.calls(), vec!["global", "storage", "scripts", "html"]);
    }

    #[tokio::test]
    async fn empty_global_falls_through() {
        let frame = FakeFrame::new(
            FakeDocument::at(PAGE)
                .with_global("")
                .with_local_storage("stored"),
        );

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "stored");
    }

    #[tokio::test]
    async fn zero_and_false_globals_fall_through_to_storage() {
        for falsy in [serde_json::json!(0), serde_json::json!(false)] {
            let frame = FakeFrame::new(
                FakeDocument::at(PAGE)
                    .with_global(falsy.clone())
                    .with_local_storage("from-storage"),
            );

            let found = extractor().extract(&frame).await.unwrap();
            assert_eq!(found.value, "from-storage", "{falsy}");
            assert_eq!(found.strategy, Strategy::Storage);
        }
    }

    #[tokio::test]
    async fn falsy_global_without_fallback_is_absent() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_global(0).with_html("<html></html>"));
        assert_eq!(extractor().extract(&frame).await, None);
    }

    #[tokio::test]
    async fn numeric_global_is_coerced() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_global(987));

        let found = extractor().extract(&frame).await.unwrap();
        assert_eq!(found.value, "987");
    }

    #[tokio::test]
    async fn failing_frame_is_absent_after_every_strategy() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).broken());

        assert_eq!(extractor().extract(&frame).await, None);
        assert_eq!(
            frame.calls(),
            vec!["global", "storage", "scripts", "html", "structural"]
        );
    }

    #[tokio::test]
    async fn nothing_found_is_none() {
        let frame = FakeFrame::new(FakeDocument::at(PAGE).with_html("<html></html>"));
        assert_eq!(extractor().extract(&frame).await, None);
    }
}
