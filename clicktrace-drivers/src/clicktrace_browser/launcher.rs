use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clicktrace_common::ClicktraceError;
use clicktrace_config::{ClicktraceConfig, LauncherKind};
use clicktrace_extract::BrowserLauncher;
use fantoccini::ClientBuilder;
use serde_json::json;
use tracing::info;
use webdriver::capabilities::Capabilities;

use crate::clicktrace_browser::browser::WebDriverBrowser;
use crate::clicktrace_browser::identity::{build_chrome_arguments, BUNDLED_ARGS};

/// Launcher selected by `browser.launcher`.
pub type DynLauncher = Box<dyn BrowserLauncher<Browser = WebDriverBrowser>>;

/// Build the launcher the configuration asks for.
pub fn launcher_from_config(cfg: &ClicktraceConfig) -> clicktrace_common::Result<DynLauncher> {
    let nav_timeout = cfg.extraction.navigation_timeout();
    match cfg.browser.launcher {
        LauncherKind::Local => {
            let args = build_chrome_arguments(&cfg.browser, &cfg.identity, &[]);
            Ok(Box::new(LocalChromeLauncher::new(
                cfg.browser.webdriver_url.clone(),
                args,
                nav_timeout,
            )))
        }
        LauncherKind::Bundled => {
            let executable = cfg.browser.executable_path.clone().ok_or_else(|| {
                ClicktraceError::Config(
                    "browser.executable_path is required for the bundled launcher".into(),
                )
            })?;
            let args = build_chrome_arguments(&cfg.browser, &cfg.identity, BUNDLED_ARGS);
            Ok(Box::new(BundledChromeLauncher::new(
                cfg.browser.webdriver_url.clone(),
                executable,
                args,
                nav_timeout,
            )))
        }
    }
}

/// Session capabilities shared by both launchers.
///
/// `eager` makes navigation return at DOM ready; the page-load timeout
/// mirrors the navigation bound so chromedriver gives up when we do.
pub fn chrome_capabilities(
    args: &[String],
    binary: Option<&Path>,
    accept_insecure_certs: bool,
    nav_timeout: Duration,
) -> Capabilities {
    let mut caps = Capabilities::new();
    let mut chrome_opts = serde_json::Map::new();
    chrome_opts.insert("args".to_string(), json!(args));
    if let Some(binary) = binary {
        chrome_opts.insert("binary".to_string(), json!(binary.display().to_string()));
    }
    caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));
    caps.insert("pageLoadStrategy".to_string(), json!("eager"));
    caps.insert(
        "timeouts".to_string(),
        json!({ "pageLoad": nav_timeout.as_millis() as u64 }),
    );
    if accept_insecure_certs {
        caps.insert("acceptInsecureCerts".to_string(), json!(true));
    }
    caps
}

async fn connect(webdriver_url: &str, caps: Capabilities) -> Result<WebDriverBrowser> {
    let client = ClientBuilder::native()
        .capabilities(caps)
        .connect(webdriver_url)
        .await
        .with_context(|| format!("failed to start a session at {webdriver_url}"))?;
    WebDriverBrowser::new(client).await
}

/// Locally installed Chrome behind a chromedriver endpoint.
#[derive(Debug, Clone)]
pub struct LocalChromeLauncher {
    webdriver_url: String,
    capabilities: Capabilities,
}

impl LocalChromeLauncher {
    pub fn new(webdriver_url: String, args: Vec<String>, nav_timeout: Duration) -> Self {
        Self {
            webdriver_url,
            capabilities: chrome_capabilities(&args, None, false, nav_timeout),
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

#[async_trait]
impl BrowserLauncher for LocalChromeLauncher {
    type Browser = WebDriverBrowser;

    async fn launch(&self) -> Result<WebDriverBrowser> {
        info!(target: "browser.webdriver", url = %self.webdriver_url, "launching local chrome");
        connect(&self.webdriver_url, self.capabilities.clone()).await
    }
}

/// Bundled serverless Chromium binary, sandbox-free, with insecure
/// certificates accepted.
#[derive(Debug, Clone)]
pub struct BundledChromeLauncher {
    webdriver_url: String,
    executable: PathBuf,
    capabilities: Capabilities,
}

impl BundledChromeLauncher {
    pub fn new(
        webdriver_url: String,
        executable: PathBuf,
        args: Vec<String>,
        nav_timeout: Duration,
    ) -> Self {
        let capabilities = chrome_capabilities(&args, Some(&executable), true, nav_timeout);
        Self {
            webdriver_url,
            executable,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

#[async_trait]
impl BrowserLauncher for BundledChromeLauncher {
    type Browser = WebDriverBrowser;

    async fn launch(&self) -> Result<WebDriverBrowser> {
        info!(
            target: "browser.webdriver",
            url = %self.webdriver_url,
            executable = %self.executable.display(),
            "launching bundled chromium"
        );
        connect(&self.webdriver_url, self.capabilities.clone()).await
    }
}
