//! Engine-level tests: vendor wiring from configuration, the last-decision
//! reflection shortcut, and memory shared across engines via the journal.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tradegraph::agents::test_support::{nvda_payloads, stub_config, StubRoster, StubVendor};
use tradegraph::memory::MemoryStore;
use tradegraph::models::{Action, ConfigError, DataCategory, VendorId};
use tradegraph::vendors::{DataVendor, LocalVendor};
use tradegraph::{build_vendors, EngineError, TradingEngine};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
}

fn stub_engine(stubs: &StubRoster, memory: Arc<MemoryStore>) -> TradingEngine {
    let config = stub_config().build().unwrap();
    let roster = stubs.build(config.model_retry_policy());
    let vendors: Vec<Arc<dyn DataVendor>> = vec![Arc::new(StubVendor::nvda())];
    TradingEngine::with_components(config, vendors, roster, memory).unwrap()
}

#[test]
fn default_config_needs_vendor_implementations() {
    // yfinance and alpha_vantage have no command configured
    let config = tradegraph::models::Configuration::builder().build().unwrap();
    match TradingEngine::new(false, config) {
        Err(EngineError::Config(ConfigError::VendorNotRegistered(vendor))) => {
            assert!(matches!(vendor, VendorId::YFinance | VendorId::AlphaVantage));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("engine built without vendor implementations"),
    }
}

#[test]
fn build_vendors_registers_commands_and_local_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = stub_config()
        .data_vendor(DataCategory::NewsData, VendorId::Google)
        .vendor_command(VendorId::Google, vec!["news-fetch".to_string()])
        .local_data_path(Some(dir.path().join("local.db")))
        .build()
        .unwrap();

    let mut ids: Vec<VendorId> = build_vendors(&config)
        .unwrap()
        .iter()
        .map(|v| v.id())
        .collect();
    ids.sort();
    assert_eq!(ids, vec![VendorId::Local, VendorId::Google]);
    assert!(TradingEngine::new(false, config).is_ok());
}

#[tokio::test]
async fn local_data_drives_a_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.db");
    {
        let seed = LocalVendor::open(&path).unwrap();
        for (category, payload) in nvda_payloads() {
            seed.insert("NVDA", category, date(), &payload, "fixture")
                .unwrap();
        }
    }

    let config = stub_config().local_data_path(Some(path)).build().unwrap();
    let stubs = StubRoster::bullish();
    let roster = stubs.build(config.model_retry_policy());
    let vendors = build_vendors(&config).unwrap();
    let engine =
        TradingEngine::with_components(config, vendors, roster, Arc::new(MemoryStore::new()))
            .unwrap();

    let (_, decision) = engine.propagate("NVDA", date()).await.unwrap();
    assert_eq!(decision.action, Action::Buy);
    assert!(decision.situation.contains("headlines"));
}

#[tokio::test]
async fn reflect_on_last_without_a_decision_is_empty() {
    let stubs = StubRoster::bullish();
    let engine = stub_engine(&stubs, Arc::new(MemoryStore::new()));
    let report = engine.reflect_on_last(dec!(0.01)).await.unwrap();
    assert!(report.recorded.is_empty());
    assert_eq!(report.skipped, 0);
    assert!(engine.memory().is_empty().unwrap());
}

#[tokio::test]
async fn reflect_on_last_remembers_the_loss() {
    let stubs = StubRoster::bullish();
    let engine = stub_engine(&stubs, Arc::new(MemoryStore::new()));

    let (trail, decision) = engine.propagate("NVDA", date()).await.unwrap();
    assert_eq!(trail.decision.as_ref().map(|d| d.id), Some(decision.id));

    let report = engine.reflect_on_last(dec!(-0.05)).await.unwrap();
    assert_eq!(report.recorded.len(), 1);
    assert!(report.recorded[0].reward < 0.0);

    let precedents = engine.memory().query("NVDA", 3).unwrap();
    assert_eq!(precedents.len(), 1);
    assert_eq!(precedents[0].realized_return, dec!(-0.05));
}

#[tokio::test]
async fn journal_carries_lessons_to_the_next_engine() {
    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("memory.db");

    {
        let stubs = StubRoster::bullish();
        let memory = Arc::new(MemoryStore::open(&journal).unwrap());
        let engine = stub_engine(&stubs, memory);
        engine.propagate("NVDA", date()).await.unwrap();
        engine.reflect_on_last(dec!(-0.05)).await.unwrap();
    }

    let stubs = StubRoster::bullish();
    let memory = Arc::new(MemoryStore::open(&journal).unwrap());
    assert_eq!(memory.len().unwrap(), 1);
    let engine = stub_engine(&stubs, memory);
    let (_, decision) = engine.propagate("NVDA", date()).await.unwrap();
    assert_eq!(decision.debate.precedents.len(), 1);
    assert!(decision.debate.precedents[0].reward < 0.0);
}

fn shipped_config() -> tradegraph::models::ConfigBuilder {
    let text = include_str!("../../../config/tradegraph.toml");
    let file: tradegraph::models::FileConfig = toml::from_str(text).unwrap();
    file.into_builder().unwrap()
}

#[test]
fn shipped_config_file_is_valid() {
    let config = shipped_config().build().unwrap();
    assert_eq!(config.max_debate_rounds(), 1);
    for category in DataCategory::ALL {
        assert_eq!(config.vendor_chain(category), vec![VendorId::Local]);
    }
    assert!(VendorId::ALL
        .into_iter()
        .all(|vendor| config.vendor_command(vendor).is_none()));
}

#[tokio::test]
async fn shipped_config_runs_on_local_data() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let results = dir.path().join("results");
    let config = shipped_config()
        .local_data_path(Some(data.join("local.db")))
        .memory_path(Some(data.join("memory.db")))
        .results_dir(Some(results.clone()))
        .build()
        .unwrap();

    // creates the missing data directory and registers every configured vendor
    assert!(TradingEngine::new(false, config.clone()).is_ok());

    let seed = LocalVendor::open(data.join("local.db")).unwrap();
    for (category, payload) in nvda_payloads() {
        seed.insert("NVDA", category, date(), &payload, "fixture")
            .unwrap();
    }

    let stubs = StubRoster::bullish();
    let roster = stubs.build(config.model_retry_policy());
    let vendors = build_vendors(&config).unwrap();
    let memory = Arc::new(MemoryStore::open(data.join("memory.db")).unwrap());
    let engine = TradingEngine::with_components(config, vendors, roster, memory).unwrap();

    let (trail, decision) = engine.propagate("NVDA", date()).await.unwrap();
    assert_eq!(decision.action, Action::Buy);
    assert!(trail.snapshot.is_some());
    assert!(tradegraph::agents::pipeline::trail_path(&results, "NVDA", date()).exists());
}
