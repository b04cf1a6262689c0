use moka::future::Cache;
use std::time::Duration;

/// In-memory hot cache backed by moka.
///
/// Keeps recently-read company snapshots close to the agents so a layer's
/// batch fetch doesn't hit SQLite twice for the same ticker in one run.
/// Entries are automatically evicted after TTL.
pub struct MemoryCache {
    inner: Cache<String, String>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, ticker: &str) -> Option<String> {
        self.inner.get(ticker).await
    }

    pub async fn insert(&self, ticker: String, record_json: String) {
        self.inner.insert(ticker, record_json).await;
    }

    pub async fn invalidate(&self, ticker: &str) {
        self.inner.invalidate(ticker).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_get() {
        let cache = MemoryCache::new(100, Duration::from_secs(60));
        cache
            .insert("NVDA".to_string(), "{\"ticker\":\"NVDA\"}".to_string())
            .await;

        let result = cache.get("NVDA").await;
        assert_eq!(result, Some("{\"ticker\":\"NVDA\"}".to_string()));
    }

    #[tokio::test]
    async fn get_missing() {
        let cache = MemoryCache::new(100, Duration::from_secs(60));
        assert_eq!(cache.get("ZZZZ").await, None);
    }

    #[tokio::test]
    async fn invalidate() {
        let cache = MemoryCache::new(100, Duration::from_secs(60));
        cache.insert("NVDA".to_string(), "{}".to_string()).await;
        cache.invalidate("NVDA").await;

        assert_eq!(cache.get("NVDA").await, None);
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = MemoryCache::new(100, Duration::from_millis(50));
        cache.insert("NVDA".to_string(), "{}".to_string()).await;

        assert!(cache.get("NVDA").await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("NVDA").await.is_none());
    }
}
