//! Network side of klangreise.
//!
//! This crate provides the `Network` abstraction the cache controller
//! fetches through, its reqwest implementation, and URL/origin helpers
//! shared by the proxy host and the CLI.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Network, UrlError, resolve, same_origin};
