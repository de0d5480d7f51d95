use serde::{Deserialize, Serialize};
use url::Url;

use crate::strategy::Strategy;

/// DOM element on which a structural marker was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub href: Option<String>,
    pub text: String,
    pub tag: String,
    pub html_snippet: String,
}

impl DetailRecord {
    /// Cap `text` and `html_snippet` at the given character counts.
    pub fn truncated(mut self, text_limit: usize, html_limit: usize) -> Self {
        truncate_chars(&mut self.text, text_limit);
        truncate_chars(&mut self.html_snippet, html_limit);
        self
    }
}

fn truncate_chars(s: &mut String, limit: usize) {
    if let Some((idx, _)) = s.char_indices().nth(limit) {
        s.truncate(idx);
    }
}

/// A value located in one frame by one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub value: String,
    pub strategy: Strategy,
    pub details: Option<DetailRecord>,
}

impl Found {
    pub fn literal(value: String, strategy: Strategy) -> Self {
        Self {
            value,
            strategy,
            details: None,
        }
    }
}

/// Where in the page topology a value was located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    MainDocument,
    SameOriginFrame(Url),
    IsolatedProbe(Url),
    AsyncAssignment,
}

/// Outcome of one page search. Absence is a normal outcome, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub value: Option<String>,
    pub details: Option<DetailRecord>,
    pub source: Option<Source>,
    /// `None` for values read by the final async wait.
    pub strategy: Option<Strategy>,
}

impl ExtractionResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn from_found(found: Found, source: Source) -> Self {
        Self {
            value: Some(found.value),
            details: found.details,
            source: Some(source),
            strategy: Some(found.strategy),
        }
    }

    pub fn is_found(&self) -> bool {
        self.value.is_some()
    }
}
