//! Vary-by rules: the dimensions that segment the cache namespace for a
//! single resource.

use http::HeaderMap;
use http::header::VARY;
use serde::{Deserialize, Serialize};

/// The tuple of request headers, query keys, and custom dimensions that a
/// cached response varies on.
///
/// Rules participate in cache-key derivation, so they must be brought into
/// canonical form with [`VaryByRules::normalize`] before any key is computed
/// or any lookup is attempted. The canonical form is what gets persisted
/// alongside the cached response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaryByRules {
    /// Optional namespace prepended to the vary key.
    pub prefix: String,
    /// Request header names (stored lowercase).
    pub headers: Vec<String>,
    /// Query string keys.
    pub query_keys: Vec<String>,
    /// Arbitrary key/value dimensions supplied by a policy.
    pub custom: Vec<(String, String)>,
}

impl VaryByRules {
    /// True when no dimension is configured at all.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
            && self.headers.is_empty()
            && self.query_keys.is_empty()
            && self.custom.is_empty()
    }

    /// Produces the canonical form: header names lowercased, name lists
    /// deduplicated and sorted byte-order ascending, custom dimensions
    /// sorted by key then value.
    pub fn normalize(mut self) -> Self {
        for name in &mut self.headers {
            name.make_ascii_lowercase();
        }
        self.headers.sort_unstable();
        self.headers.dedup();
        self.query_keys.sort_unstable();
        self.query_keys.dedup();
        self.custom.sort_unstable();
        self.custom.dedup();
        self
    }

    /// Extends the header dimensions with the names listed in a response's
    /// `Vary` header. The `*` wildcard is skipped; responses varying on `*`
    /// are rejected by the cacheability policy before rules are built.
    pub fn merge_vary_header(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(VARY) {
            let Ok(value) = value.to_str() else { continue };
            for name in value.split(',') {
                let name = name.trim();
                if name.is_empty() || name == "*" {
                    continue;
                }
                self.headers.push(name.to_ascii_lowercase());
            }
        }
    }
}
