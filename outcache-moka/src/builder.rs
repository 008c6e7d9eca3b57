use moka::future::Cache;

use crate::backend::{Expiration, MokaStorage, weigh_entry};

/// Builder for [`MokaStorage`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MokaStorageBuilder {
    size_limit: Option<u64>,
}

impl MokaStorageBuilder {
    /// Creates a builder with no size bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the total cached bytes. Entries are weighed by body plus
    /// header bytes and evicted under pressure.
    pub fn size_limit(mut self, bytes: u64) -> Self {
        self.size_limit = Some(bytes);
        self
    }

    /// Builds the backend.
    pub fn build(self) -> MokaStorage {
        let builder = Cache::builder().expire_after(Expiration);
        let cache = match self.size_limit {
            Some(limit) => builder.weigher(weigh_entry).max_capacity(limit).build(),
            None => builder.build(),
        };
        MokaStorage::new(cache)
    }
}
