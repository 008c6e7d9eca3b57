#![warn(missing_docs)]
//! # outcache-core
//!
//! Core traits and types for the `outcache` HTTP output-caching middleware.
//!
//! This crate carries everything the middleware needs that is independent of
//! the service integration: the clock abstraction, cache-key derivation,
//! vary-by rules, cached-response snapshots, the per-request context, the
//! policy hooks with their default HTTP-semantics implementation,
//! conditional-request evaluation, and the storage backend interface.
//!
//! The middleware itself lives in the `outcache` crate; the in-memory
//! reference backend lives in `outcache-moka`.

pub mod clock;
pub mod conditional;
pub mod context;
pub mod directives;
pub mod entry;
pub mod error;
pub mod headers;
pub mod key;
pub mod policy;
pub mod storage;
pub mod vary;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::CacheContext;
pub use directives::{CacheControl, MaxStale};
pub use entry::{CacheEntry, CachedResponse};
pub use error::{CacheError, ConfigurationError};
pub use key::{CacheKey, DefaultKeyProvider, KeyProvider};
pub use policy::{DefaultPolicy, PolicyProvider};
pub use storage::{Storage, StorageError, StorageResult};
pub use vary::VaryByRules;
