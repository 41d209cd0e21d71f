use async_trait::async_trait;
use chrono::NaiveDate;
use tradegraph_models::{DataCategory, VendorId};

use crate::error::VendorError;

/// A market-data source for one or more categories. Mockable for testing.
///
/// Implementations return the vendor's raw JSON; the router normalizes it.
#[async_trait]
pub trait DataVendor: Send + Sync {
    fn id(&self) -> VendorId;

    async fn fetch(
        &self,
        ticker: &str,
        date: NaiveDate,
        category: DataCategory,
    ) -> Result<serde_json::Value, VendorError>;
}
