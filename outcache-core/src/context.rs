//! Per-request cache context.

use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Uri};

use crate::entry::CachedResponse;
use crate::key::CacheKey;
use crate::vary::VaryByRules;

/// Mutable carrier passed to every collaborator for the lifetime of one
/// request.
///
/// The context is single-owner: it is created when a request enters the
/// middleware and dropped when the response (or its capture) completes.
/// Policy providers communicate decisions by mutating the public flags.
#[derive(Debug)]
pub struct CacheContext {
    method: Method,
    uri: Uri,
    request_headers: HeaderMap,
    response_started: bool,

    /// Whether the middleware should do anything at all for this request.
    pub attempt_caching: bool,
    /// Whether a cache lookup may be attempted.
    pub allow_lookup: bool,
    /// Whether the response may be captured and stored.
    pub allow_storage: bool,
    /// Whether the downstream response qualifies for storage.
    pub is_response_cacheable: bool,

    /// The key the request resolved to (base or vary form).
    pub cache_key: Option<CacheKey>,
    /// Normalized vary-by rules in effect for this request.
    pub vary_rules: Option<VaryByRules>,

    /// Wall time at which the response was served or started.
    pub response_time: Option<DateTime<Utc>>,
    /// Age of the cached entry relative to `response_time`, clamped at zero.
    pub entry_age: Option<Duration>,
    /// How long a captured response stays valid (the storage TTL).
    pub valid_for: Option<Duration>,

    /// Snapshot being assembled for commit (headers finalized, body pending).
    pub cached_response: Option<CachedResponse>,
}

impl CacheContext {
    /// Creates a context for one request.
    pub fn new(method: Method, uri: Uri, request_headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            request_headers,
            response_started: false,
            attempt_caching: false,
            allow_lookup: false,
            allow_storage: false,
            is_response_cacheable: false,
            cache_key: None,
            vary_rules: None,
            response_time: None,
            entry_age: None,
            valid_for: None,
            cached_response: None,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Whether the response-started transition has happened.
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// Performs the one-way `false → true` response-started transition.
    ///
    /// Returns `true` exactly once; later calls are no-ops returning
    /// `false`, which is what makes header finalization idempotent.
    pub fn mark_response_started(&mut self) -> bool {
        !std::mem::replace(&mut self.response_started, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CacheContext {
        CacheContext::new(
            Method::GET,
            Uri::from_static("http://example.com/a"),
            HeaderMap::new(),
        )
    }

    #[test]
    fn response_started_fires_exactly_once() {
        let mut ctx = context();
        assert!(!ctx.response_started());
        assert!(ctx.mark_response_started());
        for _ in 0..3 {
            assert!(!ctx.mark_response_started());
        }
        assert!(ctx.response_started());
    }

    #[test]
    fn new_context_starts_with_everything_off() {
        let ctx = context();
        assert!(!ctx.attempt_caching);
        assert!(!ctx.allow_lookup);
        assert!(!ctx.allow_storage);
        assert!(!ctx.is_response_cacheable);
        assert!(ctx.cache_key.is_none());
    }
}
