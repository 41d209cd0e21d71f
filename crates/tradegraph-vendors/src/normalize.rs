//! Normalization of heterogeneous vendor payloads into one schema per category.
//!
//! Vendors disagree on key names (`Close` vs `close` vs `4. close`), number
//! encodings (JSON numbers vs numeric strings) and layout (row arrays vs
//! date-keyed objects). Everything here is tolerant of those differences and
//! drops any data point dated after the requested as-of date.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tradegraph_models::{
    CategoryPayload, DataCategory, Fundamentals, IndicatorPoint, NewsItem, PriceBar,
};

const DATE_KEYS: &[&str] = &["date", "Date", "timestamp", "Timestamp", "t", "datetime"];
const OPEN_KEYS: &[&str] = &["open", "Open", "1. open", "o"];
const HIGH_KEYS: &[&str] = &["high", "High", "2. high", "h"];
const LOW_KEYS: &[&str] = &["low", "Low", "3. low", "l"];
const CLOSE_KEYS: &[&str] = &["close", "Close", "4. close", "c"];
const VOLUME_KEYS: &[&str] = &["volume", "Volume", "5. volume", "6. volume", "v"];

const HEADLINE_KEYS: &[&str] = &["headline", "title", "Title"];
const SUMMARY_KEYS: &[&str] = &["summary", "description", "snippet"];
const PUBLISHED_KEYS: &[&str] = &["published_at", "time_published", "publishedAt", "datetime", "date"];
const SENTIMENT_KEYS: &[&str] = &["sentiment", "overall_sentiment_score", "sentiment_score"];
const URL_KEYS: &[&str] = &["url", "link"];
const NEWS_LIST_KEYS: &[&str] = &["feed", "news", "articles", "items"];
const FUNDAMENTAL_SUMMARY_KEYS: &[&str] =
    &["summary", "Description", "description", "longBusinessSummary"];

pub fn normalize(
    category: DataCategory,
    raw: &Value,
    as_of: NaiveDate,
) -> Result<CategoryPayload, String> {
    match category {
        DataCategory::CoreStockApis => normalize_prices(raw, as_of).map(CategoryPayload::Prices),
        DataCategory::TechnicalIndicators => {
            normalize_indicators(raw, as_of).map(CategoryPayload::Indicators)
        }
        DataCategory::FundamentalData => {
            normalize_fundamentals(raw).map(CategoryPayload::Fundamentals)
        }
        DataCategory::NewsData => normalize_news(raw, as_of).map(CategoryPayload::News),
    }
}

fn first<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

pub(crate) fn to_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Heuristic: epoch milliseconds are past year 5138 in seconds.
            let secs = if raw.abs() > 100_000_000_000 { raw / 1000 } else { raw };
            Utc.timestamp_opt(secs, 0).single().map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(prefix) = s.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    s.get(..8)
        .and_then(|p| NaiveDate::parse_from_str(p, "%Y%m%d").ok())
}

fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    if let Value::String(s) = value {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }
        // Alpha Vantage style: 20240509T123000
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S") {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    to_date(value)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(obj) => obj.get("name").and_then(to_text),
        _ => None,
    }
}

/// Unwrap `{"Time Series (Daily)": {...}}` style envelopes.
fn unwrap_series(raw: &Value) -> &Value {
    if let Value::Object(obj) = raw {
        if let Some((_, inner)) = obj
            .iter()
            .find(|(k, v)| (k.contains("Time Series") || k.as_str() == "bars") && !v.is_null())
        {
            return inner;
        }
    }
    raw
}

fn bar_from_object(
    obj: &serde_json::Map<String, Value>,
    date: Option<NaiveDate>,
) -> Option<PriceBar> {
    let date = date.or_else(|| first(obj, DATE_KEYS).and_then(to_date))?;
    let close = first(obj, CLOSE_KEYS).and_then(to_decimal)?;
    Some(PriceBar {
        date,
        open: first(obj, OPEN_KEYS).and_then(to_decimal).unwrap_or(close),
        high: first(obj, HIGH_KEYS).and_then(to_decimal).unwrap_or(close),
        low: first(obj, LOW_KEYS).and_then(to_decimal).unwrap_or(close),
        close,
        volume: first(obj, VOLUME_KEYS)
            .and_then(to_decimal)
            .unwrap_or(Decimal::ZERO),
    })
}

pub fn normalize_prices(raw: &Value, as_of: NaiveDate) -> Result<Vec<PriceBar>, String> {
    let mut bars: Vec<PriceBar> = match unwrap_series(raw) {
        Value::Array(rows) => rows
            .iter()
            .filter_map(|row| row.as_object().and_then(|o| bar_from_object(o, None)))
            .collect(),
        Value::Object(by_date) => by_date
            .iter()
            .filter_map(|(date, row)| {
                row.as_object()
                    .and_then(|o| bar_from_object(o, parse_date_str(date)))
            })
            .collect(),
        _ => return Err("price payload is neither an array nor an object".to_string()),
    };

    bars.retain(|b| b.date <= as_of);
    if bars.is_empty() {
        return Err(format!("no price bars on or before {as_of}"));
    }
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);
    Ok(bars)
}

fn indicator_series(value: &Value, as_of: NaiveDate) -> Vec<IndicatorPoint> {
    let mut points: Vec<IndicatorPoint> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                Some(IndicatorPoint {
                    date: first(obj, DATE_KEYS).and_then(to_date)?,
                    value: first(obj, &["value", "Value"]).and_then(to_decimal)?,
                })
            })
            .collect(),
        Value::Object(by_date) => by_date
            .iter()
            .filter_map(|(date, v)| {
                let value = match v {
                    Value::Object(inner) => inner.values().find_map(to_decimal),
                    other => to_decimal(other),
                }?;
                Some(IndicatorPoint {
                    date: parse_date_str(date)?,
                    value,
                })
            })
            .collect(),
        scalar => to_decimal(scalar)
            .map(|value| vec![IndicatorPoint { date: as_of, value }])
            .unwrap_or_default(),
    };
    points.retain(|p| p.date <= as_of);
    points.sort_by_key(|p| p.date);
    points
}

pub fn normalize_indicators(
    raw: &Value,
    as_of: NaiveDate,
) -> Result<BTreeMap<String, Vec<IndicatorPoint>>, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "indicator payload must be an object keyed by indicator".to_string())?;
    let indicators: BTreeMap<String, Vec<IndicatorPoint>> = obj
        .iter()
        .map(|(name, v)| (snake_case(name), indicator_series(v, as_of)))
        .filter(|(_, series)| !series.is_empty())
        .collect();
    if indicators.is_empty() {
        return Err(format!("no indicator values on or before {as_of}"));
    }
    Ok(indicators)
}

pub fn normalize_fundamentals(raw: &Value) -> Result<Fundamentals, String> {
    let obj = raw
        .as_object()
        .ok_or_else(|| "fundamentals payload must be an object".to_string())?;
    let summary = first(obj, FUNDAMENTAL_SUMMARY_KEYS).and_then(to_text);
    let metrics: BTreeMap<String, Decimal> = obj
        .iter()
        .filter_map(|(k, v)| to_decimal(v).map(|d| (snake_case(k), d)))
        .collect();
    if metrics.is_empty() && summary.is_none() {
        return Err("fundamentals payload has no metrics or summary".to_string());
    }
    Ok(Fundamentals { metrics, summary })
}

pub fn normalize_news(raw: &Value, as_of: NaiveDate) -> Result<Vec<NewsItem>, String> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(obj) => match first(obj, NEWS_LIST_KEYS) {
            Some(Value::Array(items)) => items,
            _ => return Err("news payload has no item list".to_string()),
        },
        _ => return Err("news payload is neither an array nor an object".to_string()),
    };

    let cutoff = as_of
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive));

    let mut news: Vec<NewsItem> = items
        .iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            Some(NewsItem {
                headline: first(obj, HEADLINE_KEYS).and_then(to_text)?,
                summary: first(obj, SUMMARY_KEYS).and_then(to_text),
                source: first(obj, &["source", "publisher"]).and_then(to_text),
                published_at: first(obj, PUBLISHED_KEYS).and_then(to_datetime),
                sentiment: first(obj, SENTIMENT_KEYS).and_then(to_decimal),
                url: first(obj, URL_KEYS).and_then(to_text),
            })
        })
        .filter(|item| match (item.published_at, cutoff) {
            (Some(published), Some(cutoff)) => published < cutoff,
            _ => true,
        })
        .collect();
    news.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    Ok(news)
}

/// `MarketCapitalization` → `market_capitalization`, `EPS (TTM)` → `eps_ttm`.
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch.to_ascii_lowercase());
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_matches('_').to_string()
}
