//! Error types for cache operations.

use thiserror::Error;

/// Installation and option errors. Fatal at build time or on the first
/// request; never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The output-caching feature marker was already present on the
    /// request, meaning the middleware is installed twice in the chain.
    #[error("output caching middleware is installed more than once in the pipeline")]
    DuplicateMiddleware,

    /// A required collaborator was not supplied to the builder.
    #[error("missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// An option value fails validation.
    #[error("invalid cache options: {0}")]
    InvalidOptions(&'static str),
}

/// Errors surfaced by the middleware core.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The key provider produced an empty key when one was required.
    /// Fatal for the request; surfaces as an internal error to the host.
    #[error("cache key provider produced an empty key")]
    KeyUndefined,

    /// Installation or option error.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
