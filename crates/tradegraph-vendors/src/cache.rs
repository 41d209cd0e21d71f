use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use tradegraph_models::{CategoryData, DataCategory, VendorId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadKey {
    pub vendor: VendorId,
    pub category: DataCategory,
    pub ticker: String,
    pub date: NaiveDate,
}

impl PayloadKey {
    pub fn new(vendor: VendorId, category: DataCategory, ticker: &str, date: NaiveDate) -> Self {
        Self {
            vendor,
            category,
            ticker: ticker.to_string(),
            date,
        }
    }
}

/// In-memory cache of normalized vendor payloads backed by moka.
///
/// Entries keep the provenance of the original fetch and are evicted after TTL.
pub struct PayloadCache {
    inner: Cache<PayloadKey, CategoryData>,
}

impl PayloadCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &PayloadKey) -> Option<CategoryData> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: PayloadKey, value: CategoryData) {
        self.inner.insert(key, value).await;
    }

    pub async fn invalidate(&self, key: &PayloadKey) {
        self.inner.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tradegraph_models::{CategoryPayload, NewsItem, Provenance};

    fn key(ticker: &str) -> PayloadKey {
        PayloadKey::new(
            VendorId::AlphaVantage,
            DataCategory::NewsData,
            ticker,
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        )
    }

    fn data() -> CategoryData {
        CategoryData {
            payload: CategoryPayload::News(vec![NewsItem {
                headline: "NVDA beats".to_string(),
                summary: None,
                source: None,
                published_at: None,
                sentiment: None,
                url: None,
            }]),
            provenance: Provenance {
                vendor: VendorId::AlphaVantage,
                fetched_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn insert_and_get_keeps_provenance() {
        let cache = PayloadCache::new(100, Duration::from_secs(60));
        let original = data();
        cache.insert(key("NVDA"), original.clone()).await;

        let cached = cache.get(&key("NVDA")).await.unwrap();
        assert_eq!(cached.provenance, original.provenance);
        assert!(cache.get(&key("AAPL")).await.is_none());
    }

    #[tokio::test]
    async fn invalidate() {
        let cache = PayloadCache::new(100, Duration::from_secs(60));
        cache.insert(key("NVDA"), data()).await;
        cache.invalidate(&key("NVDA")).await;
        assert!(cache.get(&key("NVDA")).await.is_none());
    }

    #[tokio::test]
    async fn ttl_expiration() {
        let cache = PayloadCache::new(100, Duration::from_millis(50));
        cache.insert(key("NVDA"), data()).await;
        assert!(cache.get(&key("NVDA")).await.is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.get(&key("NVDA")).await.is_none());
    }
}
