#![warn(missing_docs)]
//! In-memory [`moka`] storage backend for the `outcache` middleware.
//!
//! The backend honors per-entry TTLs (an expired entry reads as absent)
//! and, when a size limit is configured, bounds the total cached bytes
//! with weight-based eviction.

mod backend;
mod builder;

pub use backend::MokaStorage;
pub use builder::MokaStorageBuilder;
