//! Cache controller and offline-first proxy host for klangreise.
//!
//! - [`controller`]: lifecycle events and per-request fetch strategies
//! - [`registration`]: active/waiting controllers for the origin
//! - [`proxy`]: HTTP/1.1 host dispatching requests through the controller

pub mod controller;
pub mod error;
pub mod proxy;
pub mod registration;

#[cfg(test)]
mod testing;

pub use controller::{CacheController, ControllerConfig, FetchEvent, FetchOutcome, ResponseSource, WorkerState};
pub use proxy::ProxyServer;
pub use registration::{Registration, UpdateOutcome};
