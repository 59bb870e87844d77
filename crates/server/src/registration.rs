//! Controller registration for one origin.
//!
//! Holds at most one active and one waiting controller. A new version is
//! installed beside the active one and only replaces it once install has
//! succeeded, so a broken deployment never takes the working one down.

use std::sync::Arc;

use klangreise_core::Error;
use tokio::sync::RwLock;

use crate::controller::{ActivationReport, CacheController};

/// What [`Registration::update`] did with a successfully installed controller.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Activated immediately and now controls clients.
    Activated(ActivationReport),
    /// Installed, parked until [`Registration::activate_waiting`].
    Waiting,
}

#[derive(Debug, Default)]
pub struct Registration {
    active: RwLock<Option<Arc<CacheController>>>,
    waiting: RwLock<Option<Arc<CacheController>>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `controller` and activate it if it asked to skip waiting or
    /// nothing is active yet.
    ///
    /// # Errors
    ///
    /// Install or activation failures are returned; the previously active
    /// controller keeps serving in both cases.
    pub async fn update(&self, controller: CacheController) -> Result<UpdateOutcome, Error> {
        if let Err(e) = controller.install().await {
            tracing::warn!(version = controller.version(), error = %e, "update rejected, keeping active controller");
            return Err(e);
        }

        let controller = Arc::new(controller);
        let nothing_active = self.active.read().await.is_none();
        if !controller.skip_waiting_requested() && !nothing_active {
            tracing::info!(version = controller.version(), "installed controller is waiting");
            *self.waiting.write().await = Some(controller);
            return Ok(UpdateOutcome::Waiting);
        }

        let report = self.promote(controller).await?;
        Ok(UpdateOutcome::Activated(report))
    }

    /// Activate the waiting controller, if any.
    pub async fn activate_waiting(&self) -> Result<Option<ActivationReport>, Error> {
        let Some(controller) = self.waiting.write().await.take() else {
            return Ok(None);
        };
        self.promote(controller).await.map(Some)
    }

    async fn promote(&self, controller: Arc<CacheController>) -> Result<ActivationReport, Error> {
        let report = controller.activate().await?;
        let previous = self.active.write().await.replace(Arc::clone(&controller));
        if let Some(previous) = previous {
            tracing::info!(from = previous.version(), to = controller.version(), "controller replaced");
        }

        let mut waiting = self.waiting.write().await;
        if waiting.as_ref().is_some_and(|w| w.version() == controller.version()) {
            *waiting = None;
        }
        Ok(report)
    }

    /// The controller currently handling fetches. `None` until one has
    /// activated and claimed clients.
    pub async fn controller(&self) -> Option<Arc<CacheController>> {
        self.active.read().await.as_ref().filter(|c| c.clients_claimed()).cloned()
    }

    pub async fn waiting(&self) -> Option<Arc<CacheController>> {
        self.waiting.read().await.clone()
    }
}
