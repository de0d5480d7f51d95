use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// Matches `<marker> = "value"` / `<marker>: 'value'` assignments in source text.
#[derive(Debug, Clone)]
pub struct AssignmentPattern {
    re: Regex,
}

impl AssignmentPattern {
    pub fn new(marker: &str) -> Result<Self, regex::Error> {
        // `\b` only holds next to a word character, so ends like `$` go unanchored.
        let edge = |c: Option<char>| match c {
            Some(c) if c.is_alphanumeric() || c == '_' => r"\b",
            _ => "",
        };
        let re = RegexBuilder::new(&format!(
            r#"{}{}{}\s*[:=]\s*["']([^"']+)["']"#,
            edge(marker.chars().next()),
            regex::escape(marker),
            edge(marker.chars().last()),
        ))
        .case_insensitive(true)
        .build()?;
        Ok(Self { re })
    }

    /// Quoted value of the first assignment in `text`.
    pub fn find(&self, text: &str) -> Option<String> {
        self.re
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// JavaScript falsiness as far as JSON can carry it: `null`, `false`, `0`
/// and `""`.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Reduce a script result to the extracted string. Falsy results count as
/// absent; arrays and objects keep their JSON text.
pub fn coerce_value(value: Value) -> Option<String> {
    if is_falsy(&value) {
        return None;
    }
    Some(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
