//! `prsync serve` command - HTTP entry point.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::pipeline::Pipeline;
use crate::server;

/// Run the serve command until interrupted.
pub fn run(config_path: &Path, listen: Option<String>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(listen) = listen {
        config.server.listen = listen;
    }
    let addr: SocketAddr = config
        .server
        .listen
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.listen))?;
    let pipeline = Arc::new(Pipeline::new(config)?);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(addr = %addr, "prsync listening");

        axum::serve(listener, server::router(pipeline))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down");
            })
            .await
            .context("server error")
    })
}
