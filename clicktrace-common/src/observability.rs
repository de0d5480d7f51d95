//! Process-wide `tracing` setup.
//!
//! The scraper binary and both integration suites log through
//! [`init_logging`]: one daily file under the resolved log directory, plus an
//! optional copy on `stderr`. Only the first call installs the subscriber;
//! later calls return the file chosen by the first.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{Builder as RollingBuilder, Rotation};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Directory override consulted when [`LogConfig::log_dir`] is unset.
pub const LOG_DIR_ENV: &str = "CLICKTRACE_LOG_DIR";

static WRITER_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static ACTIVE_FILE: OnceLock<PathBuf> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Prefix of the log file and name of the fallback data directory.
    pub app_name: &'static str,
    /// Explicit log directory; `~/` is expanded.
    pub log_dir: Option<PathBuf>,
    /// Mirror every event to `stderr`.
    pub emit_stderr: bool,
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is not set.
    pub default_filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            app_name: "clicktrace",
            log_dir: None,
            emit_stderr: true,
            format: LogFormat::Text,
            default_filter: "info".to_string(),
        }
    }
}

/// Where the rolling file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSink {
    dir: PathBuf,
    prefix: &'static str,
}

impl LogSink {
    fn resolve(config: &LogConfig) -> Self {
        let dir = config
            .log_dir
            .as_deref()
            .map(expand_home)
            .or_else(|| std::env::var_os(LOG_DIR_ENV).map(|raw| expand_home(Path::new(&raw))))
            .unwrap_or_else(|| fallback_dir(config.app_name));
        Self {
            dir,
            prefix: config.app_name,
        }
    }

    /// File the appender writes to today.
    fn current_file(&self) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d");
        self.dir.join(format!("{}.{date}.log", self.prefix))
    }

    fn open(&self) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create log directory {}", self.dir.display()))?;
        let appender = RollingBuilder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(self.prefix)
            .filename_suffix("log")
            .build(&self.dir)
            .with_context(|| format!("cannot open log file in {}", self.dir.display()))?;
        Ok(tracing_appender::non_blocking(appender))
    }
}

/// Install the global subscriber and return today's log file.
pub fn init_logging(config: LogConfig) -> anyhow::Result<PathBuf> {
    if let Some(existing) = ACTIVE_FILE.get() {
        return Ok(existing.clone());
    }

    let sink = LogSink::resolve(&config);
    let (file_writer, guard) = sink.open()?;
    let _ = WRITER_GUARD.set(guard);

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    layers.push(match config.format {
        LogFormat::Text => fmt::layer()
            .with_ansi(false)
            .with_writer(file_writer)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(file_writer).boxed(),
    });
    if config.emit_stderr {
        layers.push(match config.format {
            LogFormat::Text => fmt::layer().with_writer(std::io::stderr).boxed(),
            LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        });
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("tracing setup failed: {err}"))?;

    let file = sink.current_file();
    let _ = ACTIVE_FILE.set(file.clone());
    tracing::debug!(target: "observability", file = %file.display(), "logging initialised");
    Ok(file)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

fn fallback_dir(app_name: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app_name)
}
