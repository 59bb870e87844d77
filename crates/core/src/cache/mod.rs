//! Versioned cache stores.
//!
//! A cache store is a named map from request identity to a response
//! snapshot. The controller talks to stores only through the
//! [`CacheStorage`] trait so it can run against:
//!
//! - [`CacheDb`]: persistent SQLite backend (WAL mode, migrations)
//! - [`MemoryStorage`]: in-process backend for tests and ephemeral hosts

pub mod connection;
pub mod entries;
pub mod hash;
pub mod memory;
pub mod migrations;

use async_trait::async_trait;

pub use crate::Error;
use crate::request::{RequestKey, Response};

pub use connection::CacheDb;
pub use memory::MemoryStorage;

/// Storage abstraction over a set of named cache stores.
///
/// Operation atomicity is the backend's job; callers never lock.
/// Concurrent `put`s to the same key are last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if absent.
    async fn open(&self, name: &str) -> Result<(), Error>;

    /// Whether a store with this name exists.
    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// Names of all existing stores, in creation order.
    async fn keys(&self) -> Result<Vec<String>, Error>;

    /// Delete a store and all of its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Look up a request in one store.
    async fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, Error>;

    /// Store a response, creating the store if needed.
    async fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<(), Error>;

    /// Store several responses at once. Either all are written or none.
    async fn put_all(&self, name: &str, entries: &[(RequestKey, Response)]) -> Result<(), Error>;

    /// Number of entries in a store (0 if it does not exist).
    async fn entry_count(&self, name: &str) -> Result<u64, Error>;
}
