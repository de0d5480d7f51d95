use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clicktrace_extract::FrameHandle;
use fantoccini::wd::WindowHandle;
use serde_json::Value;
use url::Url;
use webdriver::command::{SwitchToFrameParameters, VoidWebDriverExtensionCommand, WebDriverCommand};
use webdriver::common::FrameId;

use crate::clicktrace_browser::browser::Session;

const LOCATION: &str = "return window.location.href;";

/// A document inside a page window, addressed by the chain of frame indexes
/// leading to it from the top document. The empty path is the main document.
#[derive(Clone)]
pub struct WebDriverFrame {
    session: Arc<Session>,
    window: WindowHandle,
    path: Vec<u16>,
}

impl WebDriverFrame {
    pub(crate) fn new(session: Arc<Session>, window: WindowHandle, path: Vec<u16>) -> Self {
        Self {
            session,
            window,
            path,
        }
    }

    /// Enter the frame, run `script`, and return to the top document.
    pub(crate) async fn execute(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        let _guard = self.session.lock.lock().await;
        let client = &self.session.client;
        client
            .switch_to_window(self.window.clone())
            .await
            .context("failed to switch to page window")?;
        enter_top(client).await?;

        let result = async {
            for &index in &self.path {
                client
                    .enter_frame(index)
                    .await
                    .with_context(|| format!("frame {:?} is gone", self.path))?;
            }
            client.execute(script, args).await.context("script failed")
        }
        .await;

        if !self.path.is_empty() {
            // Leave the session at the top document.
            let _ = enter_top(client).await;
        }
        result
    }
}

/// Switch the session to the top-level browsing context.
async fn enter_top(client: &fantoccini::Client) -> Result<(), fantoccini::error::CmdError> {
    let params = SwitchToFrameParameters { id: FrameId::Top };
    client
        .issue_cmd(WebDriverCommand::<VoidWebDriverExtensionCommand>::SwitchToFrame(params))
        .await?;
    Ok(())
}

#[async_trait]
impl FrameHandle for WebDriverFrame {
    async fn evaluate(&self, script: &str, args: Vec<Value>) -> Result<Value> {
        self.execute(script, args).await
    }

    async fn url(&self) -> Result<Option<Url>> {
        let href = self.execute(LOCATION, vec![]).await?;
        Ok(href.as_str().and_then(|raw| Url::parse(raw).ok()))
    }
}
