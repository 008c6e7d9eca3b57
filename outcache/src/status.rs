//! Per-request cache status and the feature marker.

use http::Response;
use strum_macros::{Display, IntoStaticStr};

/// Sentinel inserted into the request extensions while the output cache is
/// active for the current request.
///
/// Downstream handlers can probe for it to detect that their response may
/// be captured. Its presence on an *incoming* request means the middleware
/// is installed twice, which is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCacheMarker;

/// Why the cache stayed out of the way for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum BypassReason {
    /// The policy declined to attempt caching for this request.
    Declined,
    /// The lookup missed and the policy forbids storing the response.
    StorageNotAllowed,
}

/// How the middleware handled a request.
///
/// Injected into the response extensions so outer middleware and tests can
/// observe the outcome without sniffing headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// A fresh cached entry was replayed.
    Hit,
    /// The request went downstream; the response may have been captured.
    Miss,
    /// A conditional precondition matched; `304 Not Modified` was sent.
    Revalidated,
    /// `only-if-cached` with nothing usable; `504 Gateway Timeout` was sent.
    Unserviceable,
    /// Caching did not participate in this request.
    Bypass(BypassReason),
}

impl CacheStatus {
    /// Attaches this status to the given response.
    pub fn with_response<T>(self, mut response: Response<T>) -> Response<T> {
        response.extensions_mut().insert(self);
        response
    }
}
