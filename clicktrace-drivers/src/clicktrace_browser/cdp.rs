//! Chrome DevTools commands tunnelled through chromedriver's
//! `goog/cdp/execute` vendor endpoint.
use anyhow::{Context, Result};
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::Client;
use serde_json::{json, Value};
use url::Url;

#[derive(Debug, Clone)]
pub struct CdpCommand {
    pub method: String,
    pub params: Value,
}

impl CdpCommand {
    pub fn new(method: &str, params: Value) -> Self {
        Self {
            method: method.to_string(),
            params,
        }
    }

    fn body(&self) -> String {
        json!({ "cmd": self.method, "params": self.params }).to_string()
    }
}

impl WebDriverCompatibleCommand for CdpCommand {
    fn endpoint(
        &self,
        base_url: &Url,
        session_id: Option<&str>,
    ) -> std::result::Result<Url, url::ParseError> {
        let session = session_id.ok_or(url::ParseError::EmptyHost)?;
        base_url.join(&format!("session/{session}/goog/cdp/execute"))
    }

    fn method_and_body(&self, _request_url: &Url) -> (http::Method, Option<String>) {
        (http::Method::POST, Some(self.body()))
    }
}

/// Run one DevTools command against the session's current window.
pub async fn execute(client: &Client, method: &str, params: Value) -> Result<Value> {
    client
        .issue_cmd(CdpCommand::new(method, params))
        .await
        .with_context(|| format!("CDP {method} failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_session_scoped() {
        let cmd = CdpCommand::new("Network.enable", json!({}));
        let base = Url::parse("http://localhost:9515/").unwrap();
        let url = cmd.endpoint(&base, Some("abc123")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9515/session/abc123/goog/cdp/execute");
        assert!(cmd.endpoint(&base, None).is_err());
    }

    #[test]
    fn body_wraps_method_and_params() {
        let cmd = CdpCommand::new("Network.setUserAgentOverride", json!({ "userAgent": "UA" }));
        let base = Url::parse("http://localhost:9515/").unwrap();
        let (method, body) = cmd.method_and_body(&base);
        assert_eq!(method, http::Method::POST);
        let body: Value = serde_json::from_str(&body.unwrap()).unwrap();
        assert_eq!(body["cmd"], "Network.setUserAgentOverride");
        assert_eq!(body["params"]["userAgent"], "UA");
    }
}
