//! Subcommand implementations. Each returns a serializable report that
//! `main` prints as JSON.

use std::sync::Arc;

use anyhow::{Result, bail};
use klangreise_client::{Network, resolve};
use klangreise_core::{AppConfig, CacheStorage, Destination, Request};
use klangreise_server::{CacheController, FetchEvent, WorkerState};
use serde::Serialize;

use crate::args::FetchArgs;

/// Everything a command needs: validated config plus the two backends.
pub struct Context {
    pub config: AppConfig,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
}

impl Context {
    fn controller(&self) -> Result<CacheController> {
        Ok(CacheController::from_app_config(&self.config, Arc::clone(&self.storage), Arc::clone(&self.network))?)
    }
}

#[derive(Debug, Serialize)]
pub struct InstallOutput {
    pub version: String,
    pub cached: usize,
    pub assets: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ActivateOutput {
    pub version: String,
    pub evicted: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub name: String,
    pub entries: u64,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub version: String,
    pub stores: Vec<StoreStatus>,
}

#[derive(Debug, Serialize)]
pub struct FetchOutput {
    pub url: String,
    pub destination: Destination,
    pub outcome: &'static str,
    pub source: Option<&'static str>,
    pub status: Option<u16>,
    pub bytes: Option<usize>,
    pub content_type: Option<String>,
    pub background_completed: usize,
    pub background_failed: usize,
}

pub async fn install(ctx: &Context) -> Result<InstallOutput> {
    let report = ctx.controller()?.install().await?;
    Ok(InstallOutput { version: report.version, cached: report.assets.len(), assets: report.assets })
}

/// Recover, then activate. Fails if nothing is installed for the version.
async fn activated(ctx: &Context) -> Result<(CacheController, Vec<String>)> {
    let controller = ctx.controller()?;
    if controller.recover().await? != WorkerState::Installed {
        bail!("no installed cache store for {}; run `klangreise install` first", controller.version());
    }
    let report = controller.activate().await?;
    Ok((controller, report.evicted))
}

pub async fn activate(ctx: &Context) -> Result<ActivateOutput> {
    let (controller, evicted) = activated(ctx).await?;
    Ok(ActivateOutput { version: controller.version().to_string(), evicted })
}

pub async fn status(ctx: &Context) -> Result<StatusOutput> {
    let mut stores = Vec::new();
    for name in ctx.storage.keys().await? {
        let entries = ctx.storage.entry_count(&name).await?;
        let current = name == ctx.config.version_tag;
        stores.push(StoreStatus { name, entries, current });
    }
    Ok(StatusOutput { version: ctx.config.version_tag.clone(), stores })
}

pub async fn fetch(ctx: &Context, args: &FetchArgs) -> Result<FetchOutput> {
    let (controller, evicted) = activated(ctx).await?;
    if !evicted.is_empty() {
        tracing::info!(evicted = ?evicted, "stale cache stores evicted");
    }

    let url = resolve(controller.origin(), &args.path)?;
    let destination = Destination::parse(&args.destination);
    let mut event = FetchEvent::new(Request::new(&args.method, url.clone(), destination));

    let outcome = controller.handle_fetch(&mut event).await;
    let settled = event.settled().await;

    let response = outcome.response();
    Ok(FetchOutput {
        url: url.to_string(),
        destination,
        outcome: outcome.kind(),
        source: outcome.source().map(|s| s.as_str()),
        status: response.map(|r| r.status),
        bytes: response.map(|r| r.body.len()),
        content_type: response.and_then(|r| r.content_type()).map(str::to_string),
        background_completed: settled.completed,
        background_failed: settled.failed,
    })
}
