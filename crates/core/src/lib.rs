//! Core types and shared functionality for klangreise.
//!
//! This crate provides:
//! - Request/response model shared by the controller and the network client
//! - Cache storage abstraction with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod request;

pub use cache::{CacheDb, CacheStorage, MemoryStorage};
pub use config::AppConfig;
pub use error::Error;
pub use request::{Destination, Request, RequestKey, Response};
