//! Short-lived entity memoization.
//!
//! One [`EntityCache`] per entity kind, each with its own fixed TTL,
//! shields the extraction engine from redundant fetches of the same page.
//! Lookups and inserts are plain get/insert — there is deliberately no
//! single-flight deduplication, so two concurrent misses for the same key
//! both fetch. Accepted inefficiency on a cooperative runtime, not a bug.

use std::time::Duration;

use moka::future::Cache;

/// Default TTLs per entity kind.
pub const PRODUCT_TTL: Duration = Duration::from_secs(10 * 60);
pub const LISTING_TTL: Duration = Duration::from_secs(5 * 60);
pub const CART_TTL: Duration = Duration::from_secs(60);
pub const ORDER_TTL: Duration = Duration::from_secs(5 * 60);
pub const SLOT_TTL: Duration = Duration::from_secs(2 * 60);

/// Time-boxed memoization of extraction outputs, keyed by entity identity
/// (typically the page path). Entries are inserted whole and expire whole;
/// there is no partial update.
#[derive(Clone)]
pub struct EntityCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> EntityCache<V> {
    /// A cache holding up to `capacity` entries, each living for `ttl`
    /// from insertion.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Explicit cache clear, dropping every entry at once.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
