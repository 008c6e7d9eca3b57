//! TTL and size-bound behavior of the moka backend.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, StatusCode};
use outcache_core::{CacheEntry, CacheKey, CachedResponse, Storage};
use outcache_moka::MokaStorage;

fn key(id: u32) -> CacheKey {
    CacheKey::from(format!("GET\u{1e}http\u{1e}example.com/{id}"))
}

fn entry(body_size: usize) -> CacheEntry {
    CacheEntry::Response(Arc::new(CachedResponse {
        created: Utc::now(),
        status: StatusCode::OK,
        headers: HeaderMap::new(),
        body: Bytes::from(vec![0u8; body_size]),
    }))
}

#[tokio::test]
async fn entries_are_returned_until_ttl_expires() {
    let storage = MokaStorage::builder().build();
    let key = key(1);

    storage
        .set(&key, entry(16), Duration::from_millis(200))
        .await
        .unwrap();
    assert!(storage.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(
        storage.get(&key).await.unwrap().is_none(),
        "expired entry must read as absent"
    );
}

#[tokio::test]
async fn overwriting_an_entry_refreshes_its_ttl() {
    let storage = MokaStorage::builder().build();
    let key = key(1);

    storage
        .set(&key, entry(16), Duration::from_millis(150))
        .await
        .unwrap();
    storage
        .set(&key, entry(16), Duration::from_secs(60))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        storage.get(&key).await.unwrap().is_some(),
        "the new TTL must apply, not the overwritten one"
    );
}

#[tokio::test]
async fn size_limit_evicts_under_pressure() {
    // Room for roughly four 1 KiB bodies.
    let storage = MokaStorage::builder().size_limit(4 * 1200).build();
    let ttl = Duration::from_secs(60);

    let count = 16;
    for id in 0..count {
        storage.set(&key(id), entry(1024), ttl).await.unwrap();
    }
    storage.run_pending_tasks().await;

    assert!(storage.entry_count() > 0);
    assert!(
        storage.entry_count() < count as u64,
        "expected evictions, kept {}",
        storage.entry_count()
    );
    assert!(storage.weighted_size() <= 4 * 1200);

    let mut present = 0;
    for id in 0..count {
        if storage.get(&key(id)).await.unwrap().is_some() {
            present += 1;
        }
    }
    assert!(present < count);
}

#[tokio::test]
async fn unbounded_backend_keeps_everything() {
    let storage = MokaStorage::builder().build();
    let ttl = Duration::from_secs(60);

    for id in 0..32 {
        storage.set(&key(id), entry(1024), ttl).await.unwrap();
    }
    storage.run_pending_tasks().await;
    assert_eq!(storage.entry_count(), 32);
}
