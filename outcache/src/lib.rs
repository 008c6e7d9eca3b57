#![warn(missing_docs)]
//! # outcache
//!
//! Policy-driven HTTP output caching as a Tower middleware.
//!
//! For eligible requests the middleware either replays a previously
//! captured response from a pluggable storage backend or transparently
//! captures the downstream response for future reuse, while preserving
//! HTTP caching semantics: vary-by key derivation, freshness evaluation,
//! conditional-request revalidation (`304 Not Modified`), `only-if-cached`
//! (`504 Gateway Timeout`), and a bounded write-through body capture with
//! deferred commit.
//!
//! # Quick start
//!
//! ```ignore
//! use outcache::OutputCacheBuilder;
//! use outcache_moka::MokaStorage;
//! use tower::ServiceBuilder;
//!
//! let cache = OutputCacheBuilder::new()
//!     .storage(MokaStorage::builder().size_limit(64 * 1024 * 1024).build())
//!     .build()?;
//!
//! let service = ServiceBuilder::new().layer(cache).service(inner);
//! ```
//!
//! # Observability
//!
//! Every response leaving the middleware carries a [`CacheStatus`] in its
//! extensions (`Hit`, `Miss`, `Revalidated`, `Unserviceable`, or
//! `Bypass`), and decision points emit `tracing` events. While a request
//! is being handled with caching active, its extensions carry an
//! [`OutputCacheMarker`] that downstream handlers can probe for.
//!
//! The cache is transparent to errors: storage failures are logged and
//! degrade to misses, oversized responses keep streaming to the client
//! without being committed, and downstream errors propagate unchanged.

pub mod body;
pub mod config;
pub mod layer;
pub mod service;
pub mod status;

pub use body::{CaptureBody, OutputCacheBody};
pub use config::CacheOptions;
pub use layer::{NotSet, OutputCache, OutputCacheBuilder};
pub use service::OutputCacheService;
pub use status::{BypassReason, CacheStatus, OutputCacheMarker};

pub use outcache_core::{
    CacheContext, CacheEntry, CacheError, CacheKey, CachedResponse, Clock, ConfigurationError,
    DefaultKeyProvider, DefaultPolicy, KeyProvider, ManualClock, PolicyProvider, Storage,
    StorageError, SystemClock, VaryByRules,
};
