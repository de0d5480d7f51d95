use std::fmt;

use serde::{Deserialize, Serialize};

/// Lookup techniques tried against a frame, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `window[marker]` is defined.
    GlobalVariable,
    /// `localStorage` / `sessionStorage` hold the marker key.
    Storage,
    /// An assignment inside script element text.
    InlineScripts,
    /// An assignment anywhere in the serialized document.
    DocumentHtml,
    /// An element whose identifying attributes mention the marker.
    StructuralMarker,
}

impl Strategy {
    /// Full fallback chain. Earlier entries always win.
    pub const ORDERED: [Strategy; 5] = [
        Strategy::GlobalVariable,
        Strategy::Storage,
        Strategy::InlineScripts,
        Strategy::DocumentHtml,
        Strategy::StructuralMarker,
    ];

    /// Chain used when structural markers are disabled.
    pub const LITERAL_ONLY: [Strategy; 4] = [
        Strategy::GlobalVariable,
        Strategy::Storage,
        Strategy::InlineScripts,
        Strategy::DocumentHtml,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::GlobalVariable => "global_variable",
            Strategy::Storage => "storage",
            Strategy::InlineScripts => "inline_scripts",
            Strategy::DocumentHtml => "document_html",
            Strategy::StructuralMarker => "structural_marker",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_chain_is_a_prefix_of_the_full_chain() {
        assert_eq!(&Strategy::ORDERED[..4], &Strategy::LITERAL_ONLY[..]);
        assert_eq!(Strategy::ORDERED[4], Strategy::StructuralMarker);
    }

    #[test]
    fn names_match_serde() {
        for strategy in Strategy::ORDERED {
            let json = serde_json::to_value(strategy).unwrap();
            assert_eq!(json, strategy.name());
        }
    }
}
