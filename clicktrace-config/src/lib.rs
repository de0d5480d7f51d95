//! Loader for service configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later sources winning:
//!
//! 1. built-in defaults (every field has one)
//! 2. an optional or required YAML file, or inline YAML
//! 3. `CLICKTRACE__SECTION__KEY` environment variables
//! 4. `${VAR}` placeholders expanded in every string value
//! 5. the hosting environment's `PORT`, when requested
//!
//! ```yaml
//! server:
//!   port: 3000
//! browser:
//!   launcher: bundled
//!   executable_path: /opt/chromium/chrome
//! extraction:
//!   async_wait_secs: 15
//! ```
use clicktrace_common::DEFAULT_MARKER;
use clicktrace_common::observability::LogFormat;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PLACEHOLDER_PASSES: usize = 8;
const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClicktraceConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub extraction: ExtractionConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which browser launcher backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherKind {
    /// Locally installed Chrome, reached through its WebDriver endpoint.
    #[default]
    Local,
    /// Bundled serverless Chromium binary at `executable_path`.
    Bundled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub launcher: LauncherKind,
    pub webdriver_url: String,
    pub executable_path: Option<PathBuf>,
    pub headless: bool,
    /// Extra Chrome flags appended after the launcher's own.
    pub args: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            launcher: LauncherKind::Local,
            webdriver_url: "http://localhost:9515".into(),
            executable_path: None,
            headless: true,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Identifier of the value searched for.
    pub marker: String,
    pub navigation_timeout_secs: u64,
    /// Bound of the final wait for an asynchronously assigned global.
    pub async_wait_secs: u64,
    pub poll_interval_ms: u64,
    pub max_frame_depth: usize,
    /// Enables the element-attribute fallback after the document scan.
    pub structural_markers: bool,
    pub detail_text_limit: usize,
    pub detail_html_limit: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.into(),
            navigation_timeout_secs: 60,
            async_wait_secs: 10,
            poll_interval_ms: 250,
            max_frame_depth: 4,
            structural_markers: true,
            detail_text_limit: 200,
            detail_html_limit: 500,
        }
    }
}

impl ExtractionConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn async_wait(&self) -> Duration {
        Duration::from_secs(self.async_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Outgoing identification applied to every page before it is navigated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub referer: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/127.0 Safari/537.36".into(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
            accept_language: "en-US,en;q=0.9".into(),
            referer: "https://www.google.com/".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub dir: Option<PathBuf>,
    pub stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            dir: None,
            stderr: true,
            filter: "info".into(),
        }
    }
}

impl ClicktraceConfig {
    /// Reject combinations the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.browser.launcher == LauncherKind::Bundled && self.browser.executable_path.is_none()
        {
            return fail("browser.executable_path is required for the bundled launcher");
        }
        let marker = self.extraction.marker.trim();
        if marker.is_empty() || marker.chars().any(char::is_whitespace) {
            return fail("extraction.marker must be a non-empty identifier");
        }
        if self.extraction.navigation_timeout_secs == 0 {
            return fail("extraction.navigation_timeout_secs must be greater than zero");
        }
        if self.extraction.poll_interval_ms == 0 {
            return fail("extraction.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

/// Resolve `$VAR`/`${VAR}` in one string, following placeholders that expand
/// to further placeholders for a bounded number of passes. Unset variables stay
/// verbatim.
fn expand_str(raw: &str) -> String {
    let mut current = raw.to_owned();
    for _ in 0..PLACEHOLDER_PASSES {
        let next = shellexpand::env_with_context_no_errors(&current, |name| std::env::var(name).ok());
        if next == current {
            break;
        }
        current = next.into_owned();
    }
    current
}

fn expand_placeholders(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('$') => *s = expand_str(s),
        Value::Array(items) => items.iter_mut().for_each(expand_placeholders),
        Value::Object(map) => map.values_mut().for_each(expand_placeholders),
        _ => {}
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::Message(format!("invalid {PORT_ENV} value '{raw}': {e}")))
}

/// Collects sources for [`ClicktraceConfig`] and validates the merged result.
pub struct ClicktraceConfigLoader {
    sources: ConfigBuilder<DefaultState>,
    env_port: bool,
}

impl Default for ClicktraceConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClicktraceConfigLoader {
    /// Start from defaults; `CLICKTRACE__` env overrides are applied on load.
    ///
    /// ```
    /// use clicktrace_config::{ClicktraceConfigLoader, LauncherKind};
    ///
    /// let config = ClicktraceConfigLoader::new()
    ///     .with_yaml_str("server:\n  port: 8080")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.server.port, 8080);
    /// assert_eq!(config.browser.launcher, LauncherKind::Local);
    /// assert_eq!(config.extraction.marker, "clicktrackedAd_js");
    /// ```
    pub fn new() -> Self {
        Self {
            sources: Config::builder(),
            env_port: false,
        }
    }

    /// Attach a YAML/TOML/JSON file that must exist.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources = self.sources.add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is merged only when present, so deployments can run
    /// on environment variables alone.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources = self.sources.add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML document.
    ///
    /// ```
    /// use clicktrace_config::{ClicktraceConfigLoader, LauncherKind};
    ///
    /// let cfg = ClicktraceConfigLoader::new()
    ///     .with_yaml_str(
    ///         r#"
    /// browser:
    ///   launcher: bundled
    ///   executable_path: /opt/chromium/chrome
    /// extraction:
    ///   structural_markers: false
    /// "#,
    ///     )
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(cfg.browser.launcher, LauncherKind::Bundled);
    /// assert!(!cfg.extraction.structural_markers);
    /// ```
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.sources = self.sources.add_source(File::from_str(yaml, FileFormat::Yaml));
        self
    }

    /// Let the hosting environment's `PORT` override `server.port`.
    pub fn with_env_port(mut self) -> Self {
        self.env_port = true;
        self
    }

    /// Merge every source, expand placeholders, apply `PORT` and validate.
    ///
    /// ```
    /// use clicktrace_config::ClicktraceConfigLoader;
    ///
    /// unsafe { std::env::set_var("REFERER_HOST", "https://news.example"); }
    ///
    /// let config = ClicktraceConfigLoader::new()
    ///     .with_yaml_str("identity:\n  referer: \"${REFERER_HOST}/\"")
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(config.identity.referer, "https://news.example/");
    ///
    /// unsafe { std::env::remove_var("REFERER_HOST"); }
    /// ```
    pub fn load(self) -> Result<ClicktraceConfig, ConfigError> {
        // Environment is merged last so it wins over every file.
        let merged = self
            .sources
            .add_source(
                Environment::with_prefix("CLICKTRACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut raw: Value = merged.try_deserialize()?;
        expand_placeholders(&mut raw);

        let mut typed: ClicktraceConfig =
            serde_json::from_value(raw).map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.env_port {
            if let Ok(raw) = std::env::var(PORT_ENV) {
                typed.server.port = parse_port(&raw)?;
            }
        }

        typed.validate()?;
        Ok(typed)
    }
}
