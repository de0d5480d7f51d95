use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use clicktrace_common::observability::{LogConfig, LogFormat, init_logging};
use clicktrace_config::{ClicktraceConfig, ClicktraceConfigLoader};
use clicktrace_drivers::launcher_from_config;
use clicktrace_extract::PageOrchestrator;
use clicktrace_server::{ScrapeServer, ScrapeState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "clicktrace.yaml";

#[derive(Parser, Debug)]
#[command(name = "clicktrace", version, about = "Headless-browser tracking marker scraper")]
struct Cli {
    /// Config file; `clicktrace.yaml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen port, overriding `server.port` and `PORT`.
    #[arg(long)]
    port: Option<u16>,

    /// Log encoding: text or json.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn load_config(cli: &Cli) -> Result<ClicktraceConfig> {
    let loader = match &cli.config {
        Some(path) => ClicktraceConfigLoader::new().with_file(path),
        None => ClicktraceConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
    };
    let mut cfg = loader.with_env_port().load()?;
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    if let Some(format) = cli.log_format {
        cfg.logging.format = format;
    }
    Ok(cfg)
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli)?;

    let log_path = init_logging(LogConfig {
        app_name: "clicktrace",
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.stderr,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    info!(log = %log_path.display(), launcher = ?cfg.browser.launcher, "starting clicktrace");

    let launcher = launcher_from_config(&cfg)?;
    let orchestrator = PageOrchestrator::new(&cfg.extraction, cfg.identity.clone())?;
    let state = Arc::new(ScrapeState::new(launcher, orchestrator));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    ScrapeServer::new(cfg.server.clone(), state)
        .run(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn cli_overrides_config() {
        temp_env::with_var("PORT", Some("9000"), || {
            let cli = Cli::parse_from(["clicktrace", "--port", "4100", "--log-format", "json"]);
            let cfg = load_config(&cli).unwrap();
            assert_eq!(cfg.server.port, 4100);
            assert_eq!(cfg.logging.format, LogFormat::Json);
        });
    }

    #[test]
    #[serial]
    fn hosting_port_applies_without_flag() {
        temp_env::with_var("PORT", Some("9000"), || {
            let cfg = load_config(&Cli::parse_from(["clicktrace"])).unwrap();
            assert_eq!(cfg.server.port, 9000);
        });
    }

    #[test]
    #[serial]
    fn missing_explicit_config_fails() {
        temp_env::with_var_unset("PORT", || {
            let cli = Cli::parse_from(["clicktrace", "--config", "/nonexistent/clicktrace.yaml"]);
            assert!(load_config(&cli).is_err());
        });
    }
}
