use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use outcache_core::{CacheEntry, CacheKey, Storage, StorageResult};

/// Per-entry TTL: every stored value carries the duration it was installed
/// with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Expiration;

impl Expiry<CacheKey, (CacheEntry, Duration)> for Expiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &(CacheEntry, Duration),
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.1)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        value: &(CacheEntry, Duration),
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Use the NEW value's TTL; the default would preserve the old
        // expiry and cut overwritten entries short.
        Some(value.1)
    }
}

/// Eviction weight: entry payload plus the key it is filed under.
pub(crate) fn weigh_entry(key: &CacheKey, value: &(CacheEntry, Duration)) -> u32 {
    let size = key.as_str().len() + value.0.memory_size();
    u32::try_from(size).unwrap_or(u32::MAX)
}

/// In-memory storage backend built on [`moka`].
///
/// Entries expire individually at their installed TTL; when a size limit
/// is configured the total weight of live entries is bounded and older
/// entries are evicted under pressure. Cloning is cheap and all clones
/// share the same underlying cache.
#[derive(Clone)]
pub struct MokaStorage {
    cache: Cache<CacheKey, (CacheEntry, Duration)>,
}

impl std::fmt::Debug for MokaStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStorage")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl MokaStorage {
    pub(crate) fn new(cache: Cache<CacheKey, (CacheEntry, Duration)>) -> Self {
        Self { cache }
    }

    /// Creates a [`builder`](crate::MokaStorageBuilder) for configuring
    /// the backend.
    pub fn builder() -> crate::builder::MokaStorageBuilder {
        crate::builder::MokaStorageBuilder::new()
    }

    /// Flushes moka's internal maintenance queue so `entry_count` and
    /// `weighted_size` reflect recent writes and evictions.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Total weight of live entries, in the weigher's unit (bytes).
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }
}

#[async_trait]
impl Storage for MokaStorage {
    async fn get(&self, key: &CacheKey) -> StorageResult<Option<CacheEntry>> {
        Ok(self.cache.get(key).await.map(|(entry, _)| entry))
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry, ttl: Duration) -> StorageResult<()> {
        self.cache.insert(key.clone(), (entry, ttl)).await;
        Ok(())
    }
}
