//! Middleware configuration.

use std::time::Duration;

use outcache_core::ConfigurationError;

/// Capture ceiling applied when none is configured.
pub const DEFAULT_MAXIMUM_BODY_SIZE: usize = 64 * 1024;
/// Segment size of the capture buffer applied when none is configured.
pub const DEFAULT_SEGMENT_SIZE: usize = 80 * 1024;
/// Fallback TTL for responses that declare no freshness lifetime.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60);

/// Tunables of the output cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Total cached-bytes bound the storage backend is configured with.
    /// Only used for cross-validation here; enforcement is the backend's.
    pub size_limit: Option<u64>,
    /// Per-response capture ceiling. Responses growing past it keep
    /// streaming to the client but are no longer committed.
    pub maximum_body_size: usize,
    /// Fixed size of the segments the capture buffer allocates.
    pub segment_size: usize,
    /// TTL used when a cacheable response carries no `s-maxage`,
    /// `max-age` or `Expires` information.
    pub default_expiration: Duration,
    /// Whether the request path contributes to the cache key
    /// case-sensitively.
    pub use_case_sensitive_paths: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            size_limit: None,
            maximum_body_size: DEFAULT_MAXIMUM_BODY_SIZE,
            segment_size: DEFAULT_SEGMENT_SIZE,
            default_expiration: DEFAULT_EXPIRATION,
            use_case_sensitive_paths: true,
        }
    }
}

impl CacheOptions {
    /// Validates option values. Called once at build time; option errors
    /// are fatal and never retried.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.maximum_body_size == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "maximum_body_size must be greater than zero",
            ));
        }
        if self.segment_size == 0 {
            return Err(ConfigurationError::InvalidOptions(
                "segment_size must be greater than zero",
            ));
        }
        if self.default_expiration.is_zero() {
            return Err(ConfigurationError::InvalidOptions(
                "default_expiration must be greater than zero",
            ));
        }
        if let Some(limit) = self.size_limit
            && self.maximum_body_size as u64 > limit
        {
            return Err(ConfigurationError::InvalidOptions(
                "maximum_body_size must fit within size_limit",
            ));
        }
        Ok(())
    }
}
