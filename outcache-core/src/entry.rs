//! Cached response snapshots and the storage entry wrapper.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

use crate::vary::VaryByRules;

/// An immutable snapshot of a captured response.
///
/// The body holds the exact bytes the downstream wrote, up to the configured
/// capture ceiling; oversized responses are never committed, so an entry's
/// body always matches its `Content-Length` header when one is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Response-start time, equal to the entry's `Date` header.
    pub created: DateTime<Utc>,
    /// Captured status code.
    #[serde(with = "http_serde::status_code")]
    pub status: StatusCode,
    /// Captured headers, minus `Age`.
    #[serde(with = "http_serde::header_map")]
    pub headers: HeaderMap,
    /// Captured body bytes.
    pub body: Bytes,
}

impl CachedResponse {
    /// Estimated in-memory footprint, used by size-bounded backends as the
    /// eviction weight.
    pub fn memory_size(&self) -> usize {
        self.body.len() + header_map_size(&self.headers) + std::mem::size_of::<Self>()
    }
}

/// What a storage backend holds under a cache key.
///
/// Vary-by caching is a two-stage scheme: the base key maps to the vary
/// rules recorded when the resource was first captured, and the expanded
/// vary key maps to the response itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEntry {
    /// Vary-rule fan-out record, stored under the base key.
    Vary(VaryByRules),
    /// A captured response, stored under the final key.
    Response(Arc<CachedResponse>),
}

impl CacheEntry {
    /// Eviction weight of this entry.
    pub fn memory_size(&self) -> usize {
        match self {
            CacheEntry::Vary(rules) => {
                let strings = rules.prefix.len()
                    + rules.headers.iter().map(String::len).sum::<usize>()
                    + rules.query_keys.iter().map(String::len).sum::<usize>()
                    + rules
                        .custom
                        .iter()
                        .map(|(k, v)| k.len() + v.len())
                        .sum::<usize>();
                strings + std::mem::size_of::<VaryByRules>()
            }
            CacheEntry::Response(response) => response.memory_size(),
        }
    }
}

fn header_map_size(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum()
}
