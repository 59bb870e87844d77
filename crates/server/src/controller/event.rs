//! Extendable fetch events.
//!
//! Background work started while answering a request (cache writes) is
//! registered on the event with [`FetchEvent::wait_until`]. The host keeps
//! the event alive by awaiting [`FetchEvent::settled`]; dropping the event
//! instead detaches the tasks, which then finish on a best-effort basis.

use std::future::Future;

use klangreise_core::{Error, Request};
use tokio::task::JoinHandle;

/// An intercepted request plus its extend-lifetime set.
#[derive(Debug)]
pub struct FetchEvent {
    request: Request,
    pending: Vec<JoinHandle<Result<(), Error>>>,
}

/// Result of waiting for an event's background work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settled {
    pub completed: usize,
    pub failed: usize,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self { request, pending: Vec::new() }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Extend the event's lifetime until `task` completes. The task starts
    /// running immediately.
    pub fn wait_until<F>(&mut self, task: F)
    where
        F: Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.pending.push(tokio::spawn(task));
    }

    /// Number of registered background tasks.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for every registered task.
    pub async fn settled(self) -> Settled {
        let mut settled = Settled::default();
        for handle in self.pending {
            match handle.await {
                Ok(Ok(())) => settled.completed += 1,
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.request.url, error = %e, "background task failed");
                    settled.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(url = %self.request.url, error = %e, "background task aborted");
                    settled.failed += 1;
                }
            }
        }
        settled
    }
}
