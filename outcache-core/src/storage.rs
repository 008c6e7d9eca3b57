//! Pluggable storage backend interface.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::CacheEntry;
use crate::key::CacheKey;

/// Result alias for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A backend `get`/`set` failure.
///
/// Storage errors never fail a request: the middleware logs them and treats
/// a failed `get` as a miss and a failed `set` as a no-op.
#[derive(Debug, Error)]
#[error("storage backend error: {0}")]
pub struct StorageError(Box<dyn std::error::Error + Send + Sync>);

impl StorageError {
    /// Wraps any error as a storage failure.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Keyed store of cache entries with TTL-based expiration.
///
/// Implementations must honor the TTL (an expired entry is indistinguishable
/// from an absent one) and must be safe for concurrent use from many request
/// tasks. Eviction under a configured size bound is backend-defined.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Looks up an entry. Expired entries read as `None`.
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheEntry>>;

    /// Installs an entry with absolute expiry `now + ttl`, evicting older
    /// entries under size pressure.
    async fn set(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> StorageResult<()>;
}

#[async_trait]
impl<T> Storage for Arc<T>
where
    T: Storage + ?Sized,
{
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheEntry>> {
        self.as_ref().get(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> StorageResult<()> {
        self.as_ref().set(key, entry, ttl).await
    }
}
