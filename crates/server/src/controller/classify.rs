//! Request classification.

use std::fmt;

use klangreise_core::{Destination, Request};
use serde::Serialize;

/// Strategy bucket of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Audio and video: network, cache only as fallback, never written.
    Media,
    /// Navigations: network first, copy into the store, offline fallback.
    Document,
    /// Everything else: cache first, fill on miss.
    Other,
}

/// Classify a request by its declared destination.
///
/// Pure; evaluated for every request.
pub fn classify(request: &Request) -> Classification {
    match request.destination {
        Destination::Audio | Destination::Video => Classification::Media,
        Destination::Document => Classification::Document,
        _ => Classification::Other,
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Media => "media",
            Classification::Document => "document",
            Classification::Other => "other",
        })
    }
}
