use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clicktrace_config::ServerConfig;
use clicktrace_extract::BrowserLauncher;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::routes::create_router;
use crate::scrape::ScrapeState;

/// HTTP front end: binds the configured address and serves until cancelled.
pub struct ScrapeServer {
    config: ServerConfig,
    router: Router,
}

impl ScrapeServer {
    pub fn new<L>(config: ServerConfig, state: Arc<ScrapeState<L>>) -> Self
    where
        L: BrowserLauncher + 'static,
    {
        Self {
            config,
            router: create_router(state),
        }
    }

    pub fn addr(&self) -> String {
        self.config.addr()
    }

    /// Serve until `shutdown` fires, then let in-flight requests finish.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let requested = self.addr();
        let listener = TcpListener::bind(&requested)
            .await
            .with_context(|| format!("failed to bind {requested}"))?;
        let addr: SocketAddr = listener.local_addr()?;

        info!(target: "server", %addr, "Scraper running on :{}", addr.port());
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        info!(target: "server", "server stopped");
        Ok(())
    }
}
