//! klangreise-sw entry point.
//!
//! Boots the offline-first proxy: opens the cache database, installs and
//! activates the configured version, then serves until Ctrl-C.
//! Logs are JSON on stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use klangreise_client::{FetchClient, FetchConfig, Network};
use klangreise_core::{AppConfig, CacheDb, CacheStorage};
use klangreise_server::{CacheController, ProxyServer, Registration, UpdateOutcome};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.version_tag, origin = %config.origin, "starting klangreise-sw");

    let storage: Arc<dyn CacheStorage> = Arc::new(
        CacheDb::open(&config.db_path)
            .await
            .with_context(|| format!("opening cache database {}", config.db_path.display()))?,
    );
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    let controller = CacheController::from_app_config(&config, storage, Arc::clone(&network))?;
    let origin = controller.origin().clone();

    let registration = Arc::new(Registration::new());
    match registration.update(controller).await {
        Ok(UpdateOutcome::Activated(report)) => {
            tracing::info!(version = %report.version, evicted = ?report.evicted, "controller active");
        }
        Ok(UpdateOutcome::Waiting) => tracing::info!("controller installed and waiting"),
        Err(e) => tracing::error!(error = %e, "install failed, serving in passthrough mode"),
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;

    let server = ProxyServer::new(registration, network, origin);
    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await?;

    Ok(())
}
