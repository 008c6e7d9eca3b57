//! Tower layer and builder.

use std::sync::Arc;
use std::time::Duration;

use outcache_core::{
    Clock, ConfigurationError, DefaultKeyProvider, DefaultPolicy, KeyProvider, PolicyProvider,
    Storage, SystemClock,
};
use tower::Layer;

use crate::config::CacheOptions;
use crate::service::{OutputCacheService, SharedState};

/// Tower [`Layer`] adding transparent output caching to a service.
///
/// Build one with [`OutputCacheBuilder`]:
///
/// ```ignore
/// let cache = OutputCacheBuilder::new()
///     .storage(MokaStorage::builder().build())
///     .maximum_body_size(1024 * 1024)
///     .build()?;
/// let service = ServiceBuilder::new().layer(cache).service(inner);
/// ```
pub struct OutputCache<B> {
    shared: SharedState<B>,
}

impl<B> Clone for OutputCache<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B> std::fmt::Debug for OutputCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCache").finish_non_exhaustive()
    }
}

impl<S, B> Layer<S> for OutputCache<B> {
    type Service = OutputCacheService<S, B>;

    fn layer(&self, upstream: S) -> Self::Service {
        OutputCacheService::new(upstream, self.shared.clone())
    }
}

/// Marker type for the builder before a storage backend is supplied.
pub struct NotSet;

/// Fluent builder for [`OutputCache`].
///
/// The storage backend is the only required collaborator; the policy, key
/// provider and clock default to [`DefaultPolicy`], [`DefaultKeyProvider`]
/// and [`SystemClock`].
pub struct OutputCacheBuilder<B> {
    storage: B,
    policy: Option<Arc<dyn PolicyProvider>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    clock: Arc<dyn Clock>,
    options: CacheOptions,
}

impl OutputCacheBuilder<NotSet> {
    /// Creates a builder with default options and no storage backend.
    pub fn new() -> Self {
        Self {
            storage: NotSet,
            policy: None,
            key_provider: None,
            clock: Arc::new(SystemClock),
            options: CacheOptions::default(),
        }
    }
}

impl Default for OutputCacheBuilder<NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> OutputCacheBuilder<B> {
    /// Sets the storage backend.
    pub fn storage<NB>(self, storage: NB) -> OutputCacheBuilder<NB> {
        OutputCacheBuilder {
            storage,
            policy: self.policy,
            key_provider: self.key_provider,
            clock: self.clock,
            options: self.options,
        }
    }

    /// Replaces the default policy provider.
    pub fn policy(mut self, policy: impl PolicyProvider) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Replaces the default key provider.
    pub fn key_provider(mut self, key_provider: impl KeyProvider) -> Self {
        self.key_provider = Some(Arc::new(key_provider));
        self
    }

    /// Replaces the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Declares the backend's total-size bound for option validation.
    pub fn size_limit(mut self, bytes: u64) -> Self {
        self.options.size_limit = Some(bytes);
        self
    }

    /// Sets the per-response capture ceiling.
    pub fn maximum_body_size(mut self, bytes: usize) -> Self {
        self.options.maximum_body_size = bytes;
        self
    }

    /// Sets the capture buffer segment size.
    pub fn segment_size(mut self, bytes: usize) -> Self {
        self.options.segment_size = bytes;
        self
    }

    /// Sets the fallback TTL for responses without freshness information.
    pub fn default_expiration(mut self, ttl: Duration) -> Self {
        self.options.default_expiration = ttl;
        self
    }

    /// Controls whether the request path contributes to keys
    /// case-sensitively.
    pub fn use_case_sensitive_paths(mut self, enabled: bool) -> Self {
        self.options.use_case_sensitive_paths = enabled;
        self
    }
}

impl<B: Storage> OutputCacheBuilder<B> {
    /// Validates the options and builds the layer.
    pub fn build(self) -> Result<OutputCache<B>, ConfigurationError> {
        self.options.validate()?;
        let storage = self.storage;
        let clock = self.clock;
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(DefaultPolicy::new(Arc::clone(&clock))));
        let key_provider = self.key_provider.unwrap_or_else(|| {
            Arc::new(DefaultKeyProvider::new(self.options.use_case_sensitive_paths))
        });

        Ok(OutputCache {
            shared: SharedState {
                storage: Arc::new(storage),
                policy,
                key_provider,
                clock,
                options: Arc::new(self.options),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outcache_core::{CacheEntry, CacheKey, StorageResult};

    struct NullStorage;

    #[async_trait]
    impl Storage for NullStorage {
        async fn get(&self, _key: &CacheKey) -> StorageResult<Option<CacheEntry>> {
            Ok(None)
        }

        async fn set(
            &self,
            _key: &CacheKey,
            _entry: CacheEntry,
            _ttl: Duration,
        ) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn build_rejects_invalid_options() {
        let error = OutputCacheBuilder::new()
            .storage(NullStorage)
            .maximum_body_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidOptions(_)));
    }

    #[test]
    fn build_with_defaults_succeeds() {
        assert!(OutputCacheBuilder::new().storage(NullStorage).build().is_ok());
    }
}
