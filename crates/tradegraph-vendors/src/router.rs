use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};
use tradegraph_models::{
    CategoryData, ConfigError, Configuration, DataCategory, MarketSnapshot, Provenance,
    RetryPolicy, VendorId,
};

use crate::cache::{PayloadCache, PayloadKey};
use crate::error::VendorError;
use crate::normalize::normalize;
use crate::vendor::DataVendor;

const CACHE_CAPACITY: u64 = 10_000;

/// Reject tickers that could never be valid before any vendor is contacted.
pub fn validate_ticker(ticker: &str) -> Result<(), VendorError> {
    let valid = !ticker.is_empty()
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));
    if valid {
        Ok(())
    } else {
        Err(VendorError::Rejected {
            vendor: None,
            category: None,
            reason: format!("invalid ticker {ticker:?}"),
        })
    }
}

/// Resolves each data category to its configured vendor chain and returns
/// normalized payloads.
///
/// Per vendor, `Unavailable` is retried with exponential backoff; once the
/// budget is spent the next fallback vendor is tried. `Rejected` is returned
/// immediately. Successful payloads are cached by `(vendor, category, ticker, date)`.
pub struct DataVendorRouter {
    vendors: HashMap<VendorId, Arc<dyn DataVendor>>,
    chains: BTreeMap<DataCategory, Vec<VendorId>>,
    retry: RetryPolicy,
    cache: PayloadCache,
}

impl DataVendorRouter {
    /// Build a router for `config`. Every vendor the configuration references
    /// must have an implementation in `vendors`.
    pub fn new(
        config: &Configuration,
        vendors: Vec<Arc<dyn DataVendor>>,
    ) -> Result<Self, ConfigError> {
        let vendors: HashMap<VendorId, Arc<dyn DataVendor>> =
            vendors.into_iter().map(|v| (v.id(), v)).collect();

        if let Some(missing) = config
            .referenced_vendors()
            .into_iter()
            .find(|id| !vendors.contains_key(id))
        {
            return Err(ConfigError::VendorNotRegistered(missing));
        }

        let chains = DataCategory::ALL
            .iter()
            .map(|c| (*c, config.vendor_chain(*c)))
            .collect();

        Ok(Self {
            vendors,
            chains,
            retry: config.vendor_retry_policy(),
            cache: PayloadCache::new(CACHE_CAPACITY, config.snapshot_cache_ttl()),
        })
    }

    /// Fetch and normalize every requested category for `(ticker, date)`.
    pub async fn fetch(
        &self,
        ticker: &str,
        date: NaiveDate,
        categories: &[DataCategory],
    ) -> Result<MarketSnapshot, VendorError> {
        validate_ticker(ticker)?;
        let started = Instant::now();

        let mut snapshot = MarketSnapshot::new(ticker, date);
        for category in categories {
            let data = self.fetch_category(ticker, date, *category).await?;
            snapshot.categories.insert(*category, data);
        }

        info!(
            ticker,
            %date,
            categories = snapshot.categories.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Market snapshot assembled"
        );
        Ok(snapshot)
    }

    async fn fetch_category(
        &self,
        ticker: &str,
        date: NaiveDate,
        category: DataCategory,
    ) -> Result<CategoryData, VendorError> {
        let chain = self.chains.get(&category).map(|c| c.as_slice()).unwrap_or(&[]);
        let mut last_err = None;

        for vendor_id in chain {
            let Some(vendor) = self.vendors.get(vendor_id) else {
                continue;
            };
            match self.fetch_from(vendor.as_ref(), ticker, date, category).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() => {
                    warn!(vendor = %vendor_id, %category, ticker, error = %e, "Vendor exhausted, trying fallback");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| VendorError::Rejected {
            vendor: None,
            category: Some(category),
            reason: "no vendor configured".to_string(),
        }))
    }

    async fn fetch_from(
        &self,
        vendor: &dyn DataVendor,
        ticker: &str,
        date: NaiveDate,
        category: DataCategory,
    ) -> Result<CategoryData, VendorError> {
        let key = PayloadKey::new(vendor.id(), category, ticker, date);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(vendor = %vendor.id(), %category, ticker, "Payload cache hit");
            return Ok(hit);
        }

        let mut attempt = 0;
        let raw = loop {
            match vendor.fetch(ticker, date, category).await {
                Ok(raw) => break raw,
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        vendor = %vendor.id(),
                        %category,
                        ticker,
                        attempt,
                        max_retries = self.retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Vendor unavailable, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        let payload = normalize(category, &raw, date)
            .map_err(|reason| VendorError::rejected(vendor.id(), category, reason))?;
        let data = CategoryData {
            payload,
            provenance: Provenance {
                vendor: vendor.id(),
                fetched_at: Utc::now(),
            },
        };
        self.cache.insert(key, data.clone()).await;
        Ok(data)
    }
}
