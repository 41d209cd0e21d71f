use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{DataCategory, VendorId};

/// One daily OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub value: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Fundamentals {
    /// Numeric metrics keyed by normalized snake_case name (e.g. `pe_ratio`).
    pub metrics: BTreeMap<String, Decimal>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsItem {
    pub headline: String,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// -1.0 to 1.0 when the vendor provides a sentiment score.
    pub sentiment: Option<Decimal>,
    pub url: Option<String>,
}

/// Normalized payload for one data category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CategoryPayload {
    Prices(Vec<PriceBar>),
    /// Indicator name → series ordered oldest first.
    Indicators(BTreeMap<String, Vec<IndicatorPoint>>),
    Fundamentals(Fundamentals),
    News(Vec<NewsItem>),
}

impl CategoryPayload {
    pub fn category(&self) -> DataCategory {
        match self {
            CategoryPayload::Prices(_) => DataCategory::CoreStockApis,
            CategoryPayload::Indicators(_) => DataCategory::TechnicalIndicators,
            CategoryPayload::Fundamentals(_) => DataCategory::FundamentalData,
            CategoryPayload::News(_) => DataCategory::NewsData,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    pub vendor: VendorId,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryData {
    pub payload: CategoryPayload,
    pub provenance: Provenance,
}

/// Everything fetched for one `(ticker, date)` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub categories: BTreeMap<DataCategory, CategoryData>,
}

impl MarketSnapshot {
    pub fn new(ticker: impl Into<String>, as_of: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            as_of,
            categories: BTreeMap::new(),
        }
    }

    pub fn get(&self, category: DataCategory) -> Option<&CategoryData> {
        self.categories.get(&category)
    }

    pub fn prices(&self) -> Option<&[PriceBar]> {
        match self.get(DataCategory::CoreStockApis).map(|d| &d.payload) {
            Some(CategoryPayload::Prices(bars)) => Some(bars),
            _ => None,
        }
    }

    pub fn latest_close(&self) -> Option<Decimal> {
        self.prices().and_then(|bars| bars.last()).map(|b| b.close)
    }

    /// Copy of the snapshot restricted to the given categories.
    pub fn view(&self, categories: &[DataCategory]) -> MarketSnapshot {
        MarketSnapshot {
            ticker: self.ticker.clone(),
            as_of: self.as_of,
            categories: self
                .categories
                .iter()
                .filter(|(c, _)| categories.contains(c))
                .map(|(c, d)| (*c, d.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(day: u32, close: Decimal) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
        }
    }

    fn sample_snapshot() -> MarketSnapshot {
        let mut snapshot =
            MarketSnapshot::new("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        snapshot.categories.insert(
            DataCategory::CoreStockApis,
            CategoryData {
                payload: CategoryPayload::Prices(vec![bar(8, dec!(900.5)), bar(9, dec!(905.0))]),
                provenance: Provenance {
                    vendor: VendorId::Local,
                    fetched_at: Utc::now(),
                },
            },
        );
        snapshot.categories.insert(
            DataCategory::NewsData,
            CategoryData {
                payload: CategoryPayload::News(vec![]),
                provenance: Provenance {
                    vendor: VendorId::Google,
                    fetched_at: Utc::now(),
                },
            },
        );
        snapshot
    }

    #[test]
    fn latest_close_reads_last_bar() {
        assert_eq!(sample_snapshot().latest_close(), Some(dec!(905.0)));
    }

    #[test]
    fn view_restricts_categories() {
        let view = sample_snapshot().view(&[DataCategory::NewsData]);
        assert_eq!(view.categories.len(), 1);
        assert!(view.prices().is_none());
        assert_eq!(view.ticker, "NVDA");
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let json = serde_json::to_value(CategoryPayload::News(vec![])).unwrap();
        assert_eq!(json["kind"], "news");
        assert_eq!(
            CategoryPayload::News(vec![]).category(),
            DataCategory::NewsData
        );
    }
}
