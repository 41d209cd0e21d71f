use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Unknown LLM provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown data vendor: {0}")]
    UnknownVendor(String),

    #[error("Unknown data category: {0}")]
    UnknownCategory(String),

    #[error("Unknown analyst: {0}")]
    UnknownAnalyst(String),

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("max_debate_rounds must be at least 1, got {0}")]
    InvalidDebateRounds(u32),

    #[error("No vendor configured for {0}")]
    MissingVendor(DataCategory),

    #[error("Vendor {vendor} cannot serve {category}")]
    VendorNotAllowed {
        category: DataCategory,
        vendor: VendorId,
    },

    #[error("No implementation registered for vendor {0}")]
    VendorNotRegistered(VendorId),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Google => "google",
            LlmProvider::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "google" => Ok(LlmProvider::Google),
            "deepseek" => Ok(LlmProvider::DeepSeek),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// Logical data categories the router resolves to vendors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    CoreStockApis,
    TechnicalIndicators,
    FundamentalData,
    NewsData,
}

impl DataCategory {
    pub const ALL: [DataCategory; 4] = [
        DataCategory::CoreStockApis,
        DataCategory::TechnicalIndicators,
        DataCategory::FundamentalData,
        DataCategory::NewsData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::CoreStockApis => "core_stock_apis",
            DataCategory::TechnicalIndicators => "technical_indicators",
            DataCategory::FundamentalData => "fundamental_data",
            DataCategory::NewsData => "news_data",
        }
    }

    /// Vendors able to serve this category.
    pub fn allowed_vendors(&self) -> &'static [VendorId] {
        match self {
            DataCategory::CoreStockApis | DataCategory::TechnicalIndicators => {
                &[VendorId::YFinance, VendorId::AlphaVantage, VendorId::Local]
            }
            DataCategory::FundamentalData => {
                &[VendorId::OpenAi, VendorId::AlphaVantage, VendorId::Local]
            }
            DataCategory::NewsData => &[
                VendorId::OpenAi,
                VendorId::AlphaVantage,
                VendorId::Google,
                VendorId::Local,
            ],
        }
    }

    pub fn allows(&self, vendor: VendorId) -> bool {
        self.allowed_vendors().contains(&vendor)
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VendorId {
    #[serde(rename = "yfinance")]
    YFinance,
    #[serde(rename = "alpha_vantage")]
    AlphaVantage,
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "google")]
    Google,
}

impl VendorId {
    pub const ALL: [VendorId; 5] = [
        VendorId::YFinance,
        VendorId::AlphaVantage,
        VendorId::Local,
        VendorId::OpenAi,
        VendorId::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VendorId::YFinance => "yfinance",
            VendorId::AlphaVantage => "alpha_vantage",
            VendorId::Local => "local",
            VendorId::OpenAi => "openai",
            VendorId::Google => "google",
        }
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VendorId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VendorId::ALL
            .into_iter()
            .find(|v| v.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownVendor(s.to_string()))
    }
}

/// Analyst roles that can be switched on or off per deployment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AnalystKind {
    Market,
    Fundamentals,
    News,
}

impl AnalystKind {
    pub const ALL: [AnalystKind; 3] = [
        AnalystKind::Market,
        AnalystKind::Fundamentals,
        AnalystKind::News,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::Fundamentals => "fundamentals",
            AnalystKind::News => "news",
        }
    }

    /// Data categories this analyst reads.
    pub fn categories(&self) -> &'static [DataCategory] {
        match self {
            AnalystKind::Market => &[
                DataCategory::CoreStockApis,
                DataCategory::TechnicalIndicators,
            ],
            AnalystKind::Fundamentals => &[DataCategory::FundamentalData],
            AnalystKind::News => &[DataCategory::NewsData],
        }
    }
}

impl FromStr for AnalystKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalystKind::ALL
            .into_iter()
            .find(|a| a.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownAnalyst(s.to_string()))
    }
}

/// Fully resolved category → vendor mapping. Every category has exactly one vendor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataVendors {
    pub core_stock_apis: VendorId,
    pub technical_indicators: VendorId,
    pub fundamental_data: VendorId,
    pub news_data: VendorId,
}

impl DataVendors {
    pub fn get(&self, category: DataCategory) -> VendorId {
        match category {
            DataCategory::CoreStockApis => self.core_stock_apis,
            DataCategory::TechnicalIndicators => self.technical_indicators,
            DataCategory::FundamentalData => self.fundamental_data,
            DataCategory::NewsData => self.news_data,
        }
    }
}

/// Bounded retry schedule with exponential backoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): initial, 2x, 4x, ...
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }
}

/// Validated, frozen engine configuration.
///
/// Built exclusively through [`ConfigBuilder::build`]; there are no setters.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Configuration {
    llm_provider: LlmProvider,
    deep_think_llm: String,
    quick_think_llm: String,
    backend_url: Option<String>,
    llm_command: String,
    max_debate_rounds: u32,
    data_vendors: DataVendors,
    vendor_fallbacks: BTreeMap<DataCategory, Vec<VendorId>>,
    vendor_commands: BTreeMap<VendorId, Vec<String>>,
    selected_analysts: Vec<AnalystKind>,
    memory_top_k: usize,
    model_retries: u32,
    vendor_retries: u32,
    retry_backoff_ms: u64,
    model_timeout_seconds: u64,
    snapshot_cache_ttl_seconds: u64,
    memory_path: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    local_data_path: Option<PathBuf>,
}

impl Configuration {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn llm_provider(&self) -> LlmProvider {
        self.llm_provider
    }

    pub fn deep_think_llm(&self) -> &str {
        &self.deep_think_llm
    }

    pub fn quick_think_llm(&self) -> &str {
        &self.quick_think_llm
    }

    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref()
    }

    pub fn llm_command(&self) -> &str {
        &self.llm_command
    }

    pub fn max_debate_rounds(&self) -> u32 {
        self.max_debate_rounds
    }

    pub fn data_vendors(&self) -> &DataVendors {
        &self.data_vendors
    }

    pub fn vendor_for(&self, category: DataCategory) -> VendorId {
        self.data_vendors.get(category)
    }

    /// Primary vendor followed by configured fallbacks, without duplicates.
    pub fn vendor_chain(&self, category: DataCategory) -> Vec<VendorId> {
        let mut chain = vec![self.vendor_for(category)];
        if let Some(fallbacks) = self.vendor_fallbacks.get(&category) {
            for vendor in fallbacks {
                if !chain.contains(vendor) {
                    chain.push(*vendor);
                }
            }
        }
        chain
    }

    /// Every vendor referenced by the mapping or a fallback chain.
    pub fn referenced_vendors(&self) -> Vec<VendorId> {
        let mut vendors: Vec<VendorId> = DataCategory::ALL
            .iter()
            .flat_map(|c| self.vendor_chain(*c))
            .collect();
        vendors.sort();
        vendors.dedup();
        vendors
    }

    pub fn vendor_command(&self, vendor: VendorId) -> Option<&[String]> {
        self.vendor_commands.get(&vendor).map(|v| v.as_slice())
    }

    pub fn selected_analysts(&self) -> &[AnalystKind] {
        &self.selected_analysts
    }

    /// Categories needed by the selected analysts, in stable order.
    pub fn required_categories(&self) -> Vec<DataCategory> {
        let mut categories: Vec<DataCategory> = self
            .selected_analysts
            .iter()
            .flat_map(|a| a.categories().iter().copied())
            .collect();
        categories.sort();
        categories.dedup();
        categories
    }

    pub fn memory_top_k(&self) -> usize {
        self.memory_top_k
    }

    pub fn model_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.model_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn vendor_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.vendor_retries,
            initial_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_seconds)
    }

    pub fn snapshot_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.snapshot_cache_ttl_seconds)
    }

    pub fn memory_path(&self) -> Option<&PathBuf> {
        self.memory_path.as_ref()
    }

    pub fn results_dir(&self) -> Option<&PathBuf> {
        self.results_dir.as_ref()
    }

    pub fn local_data_path(&self) -> Option<&PathBuf> {
        self.local_data_path.as_ref()
    }

    /// Start a builder seeded with this configuration, for copy-and-override.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            llm_provider: self.llm_provider,
            deep_think_llm: self.deep_think_llm.clone(),
            quick_think_llm: self.quick_think_llm.clone(),
            backend_url: self.backend_url.clone(),
            llm_command: self.llm_command.clone(),
            max_debate_rounds: self.max_debate_rounds,
            data_vendors: DataCategory::ALL
                .iter()
                .map(|c| (*c, self.data_vendors.get(*c)))
                .collect(),
            vendor_fallbacks: self.vendor_fallbacks.clone(),
            vendor_commands: self.vendor_commands.clone(),
            selected_analysts: self.selected_analysts.clone(),
            memory_top_k: self.memory_top_k,
            model_retries: self.model_retries,
            vendor_retries: self.vendor_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            model_timeout_seconds: self.model_timeout_seconds,
            snapshot_cache_ttl_seconds: self.snapshot_cache_ttl_seconds,
            memory_path: self.memory_path.clone(),
            results_dir: self.results_dir.clone(),
            local_data_path: self.local_data_path.clone(),
        }
    }
}

/// Mutable staging area for a [`Configuration`].
///
/// `Default` carries the stock configuration: OpenAI with `o4-mini` for deep
/// reasoning and `gpt-4o-mini` for quick calls, one debate round, yfinance for
/// prices and indicators, Alpha Vantage for fundamentals and news.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigBuilder {
    llm_provider: LlmProvider,
    deep_think_llm: String,
    quick_think_llm: String,
    backend_url: Option<String>,
    llm_command: String,
    max_debate_rounds: u32,
    data_vendors: BTreeMap<DataCategory, VendorId>,
    vendor_fallbacks: BTreeMap<DataCategory, Vec<VendorId>>,
    vendor_commands: BTreeMap<VendorId, Vec<String>>,
    selected_analysts: Vec<AnalystKind>,
    memory_top_k: usize,
    model_retries: u32,
    vendor_retries: u32,
    retry_backoff_ms: u64,
    model_timeout_seconds: u64,
    snapshot_cache_ttl_seconds: u64,
    memory_path: Option<PathBuf>,
    results_dir: Option<PathBuf>,
    local_data_path: Option<PathBuf>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::OpenAi,
            deep_think_llm: "o4-mini".to_string(),
            quick_think_llm: "gpt-4o-mini".to_string(),
            backend_url: Some("https://api.openai.com/v1".to_string()),
            llm_command: "claude".to_string(),
            max_debate_rounds: 1,
            data_vendors: BTreeMap::from([
                (DataCategory::CoreStockApis, VendorId::YFinance),
                (DataCategory::TechnicalIndicators, VendorId::YFinance),
                (DataCategory::FundamentalData, VendorId::AlphaVantage),
                (DataCategory::NewsData, VendorId::AlphaVantage),
            ]),
            vendor_fallbacks: BTreeMap::new(),
            vendor_commands: BTreeMap::new(),
            selected_analysts: AnalystKind::ALL.to_vec(),
            memory_top_k: 2,
            model_retries: 2,
            vendor_retries: 3,
            retry_backoff_ms: 500,
            model_timeout_seconds: 120,
            snapshot_cache_ttl_seconds: 300,
            memory_path: None,
            results_dir: None,
            local_data_path: None,
        }
    }
}

impl ConfigBuilder {
    pub fn llm_provider(mut self, provider: LlmProvider) -> Self {
        self.llm_provider = provider;
        self
    }

    pub fn deep_think_llm(mut self, model: impl Into<String>) -> Self {
        self.deep_think_llm = model.into();
        self
    }

    pub fn quick_think_llm(mut self, model: impl Into<String>) -> Self {
        self.quick_think_llm = model.into();
        self
    }

    pub fn backend_url(mut self, url: Option<String>) -> Self {
        self.backend_url = url;
        self
    }

    pub fn llm_command(mut self, program: impl Into<String>) -> Self {
        self.llm_command = program.into();
        self
    }

    pub fn max_debate_rounds(mut self, rounds: u32) -> Self {
        self.max_debate_rounds = rounds;
        self
    }

    /// Replace the whole category mapping. Categories left out fail at `build`.
    pub fn data_vendors(mut self, vendors: BTreeMap<DataCategory, VendorId>) -> Self {
        self.data_vendors = vendors;
        self
    }

    pub fn data_vendor(mut self, category: DataCategory, vendor: VendorId) -> Self {
        self.data_vendors.insert(category, vendor);
        self
    }

    pub fn vendor_fallbacks(mut self, category: DataCategory, vendors: Vec<VendorId>) -> Self {
        self.vendor_fallbacks.insert(category, vendors);
        self
    }

    pub fn vendor_command(mut self, vendor: VendorId, argv: Vec<String>) -> Self {
        self.vendor_commands.insert(vendor, argv);
        self
    }

    pub fn selected_analysts(mut self, analysts: Vec<AnalystKind>) -> Self {
        self.selected_analysts = analysts;
        self
    }

    pub fn memory_top_k(mut self, k: usize) -> Self {
        self.memory_top_k = k;
        self
    }

    pub fn model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    pub fn vendor_retries(mut self, retries: u32) -> Self {
        self.vendor_retries = retries;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    pub fn model_timeout_seconds(mut self, seconds: u64) -> Self {
        self.model_timeout_seconds = seconds;
        self
    }

    pub fn snapshot_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.snapshot_cache_ttl_seconds = seconds;
        self
    }

    pub fn memory_path(mut self, path: Option<PathBuf>) -> Self {
        self.memory_path = path;
        self
    }

    pub fn results_dir(mut self, path: Option<PathBuf>) -> Self {
        self.results_dir = path;
        self
    }

    pub fn local_data_path(mut self, path: Option<PathBuf>) -> Self {
        self.local_data_path = path;
        self
    }

    /// String-keyed override, e.g. `set("max_debate_rounds", "3")` or
    /// `set("data_vendors.news_data", "google")`. Unknown keys are rejected.
    pub fn set(mut self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if let Some(category) = key.strip_prefix("data_vendors.") {
            let category: DataCategory = category.parse()?;
            self.data_vendors.insert(category, value.parse()?);
            return Ok(self);
        }
        if let Some(category) = key.strip_prefix("vendor_fallbacks.") {
            let category: DataCategory = category.parse()?;
            let vendors = split_list(value)
                .map(VendorId::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            self.vendor_fallbacks.insert(category, vendors);
            return Ok(self);
        }
        if let Some(vendor) = key.strip_prefix("vendor_commands.") {
            let vendor: VendorId = vendor.parse()?;
            let argv = value.split_whitespace().map(str::to_string).collect();
            self.vendor_commands.insert(vendor, argv);
            return Ok(self);
        }

        match key {
            "llm_provider" => self.llm_provider = value.parse()?,
            "deep_think_llm" => self.deep_think_llm = value.to_string(),
            "quick_think_llm" => self.quick_think_llm = value.to_string(),
            "backend_url" => {
                self.backend_url = (!value.is_empty()).then(|| value.to_string());
            }
            "llm_command" => self.llm_command = value.to_string(),
            "max_debate_rounds" => self.max_debate_rounds = parse_number(key, value)?,
            "selected_analysts" => {
                self.selected_analysts = split_list(value)
                    .map(AnalystKind::from_str)
                    .collect::<Result<Vec<_>, _>>()?;
            }
            "memory_top_k" => self.memory_top_k = parse_number(key, value)?,
            "model_retries" => self.model_retries = parse_number(key, value)?,
            "vendor_retries" => self.vendor_retries = parse_number(key, value)?,
            "retry_backoff_ms" => self.retry_backoff_ms = parse_number(key, value)?,
            "model_timeout_seconds" => self.model_timeout_seconds = parse_number(key, value)?,
            "snapshot_cache_ttl_seconds" => {
                self.snapshot_cache_ttl_seconds = parse_number(key, value)?
            }
            "memory_path" => self.memory_path = optional_path(value),
            "results_dir" => self.results_dir = optional_path(value),
            "local_data_path" => self.local_data_path = optional_path(value),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(self)
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<Configuration, ConfigError> {
        if self.max_debate_rounds < 1 {
            return Err(ConfigError::InvalidDebateRounds(self.max_debate_rounds));
        }
        if self.deep_think_llm.trim().is_empty() {
            return Err(invalid("deep_think_llm", "must not be empty"));
        }
        if self.quick_think_llm.trim().is_empty() {
            return Err(invalid("quick_think_llm", "must not be empty"));
        }
        if self.llm_command.trim().is_empty() {
            return Err(invalid("llm_command", "must not be empty"));
        }
        if self.memory_top_k < 1 {
            return Err(invalid("memory_top_k", "must be at least 1"));
        }
        if self.model_timeout_seconds < 1 {
            return Err(invalid("model_timeout_seconds", "must be at least 1"));
        }

        let resolve = |category: DataCategory| -> Result<VendorId, ConfigError> {
            let vendor = *self
                .data_vendors
                .get(&category)
                .ok_or(ConfigError::MissingVendor(category))?;
            if !category.allows(vendor) {
                return Err(ConfigError::VendorNotAllowed { category, vendor });
            }
            Ok(vendor)
        };
        let data_vendors = DataVendors {
            core_stock_apis: resolve(DataCategory::CoreStockApis)?,
            technical_indicators: resolve(DataCategory::TechnicalIndicators)?,
            fundamental_data: resolve(DataCategory::FundamentalData)?,
            news_data: resolve(DataCategory::NewsData)?,
        };

        for (category, vendors) in &self.vendor_fallbacks {
            if let Some(vendor) = vendors.iter().find(|v| !category.allows(**v)) {
                return Err(ConfigError::VendorNotAllowed {
                    category: *category,
                    vendor: *vendor,
                });
            }
        }

        for (vendor, argv) in &self.vendor_commands {
            if *vendor == VendorId::Local {
                return Err(invalid(
                    "vendor_commands.local",
                    "the local vendor reads local_data_path",
                ));
            }
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(invalid(
                    &format!("vendor_commands.{vendor}"),
                    "command must not be empty",
                ));
            }
        }

        let mut selected_analysts = Vec::with_capacity(self.selected_analysts.len());
        for analyst in self.selected_analysts {
            if !selected_analysts.contains(&analyst) {
                selected_analysts.push(analyst);
            }
        }
        if selected_analysts.is_empty() {
            return Err(invalid("selected_analysts", "at least one analyst is required"));
        }

        let backend_url = self.backend_url.filter(|u| !u.trim().is_empty());

        Ok(Configuration {
            llm_provider: self.llm_provider,
            deep_think_llm: self.deep_think_llm,
            quick_think_llm: self.quick_think_llm,
            backend_url,
            llm_command: self.llm_command,
            max_debate_rounds: self.max_debate_rounds,
            data_vendors,
            vendor_fallbacks: self.vendor_fallbacks,
            vendor_commands: self.vendor_commands,
            selected_analysts,
            memory_top_k: self.memory_top_k,
            model_retries: self.model_retries,
            vendor_retries: self.vendor_retries,
            retry_backoff_ms: self.retry_backoff_ms,
            model_timeout_seconds: self.model_timeout_seconds,
            snapshot_cache_ttl_seconds: self.snapshot_cache_ttl_seconds,
            memory_path: self.memory_path,
            results_dir: self.results_dir,
            local_data_path: self.local_data_path,
        })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| invalid(key, format!("{value:?}: {e}")))
}

fn optional_path(value: &str) -> Option<PathBuf> {
    (!value.is_empty()).then(|| PathBuf::from(value))
}

/// On-disk configuration. Every field is an override on top of the defaults.
///
/// Unknown keys are rejected at parse time. Vendor and category names are kept
/// as strings here so that bad names surface as typed [`ConfigError`]s.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub llm_provider: Option<String>,
    pub deep_think_llm: Option<String>,
    pub quick_think_llm: Option<String>,
    pub backend_url: Option<String>,
    pub llm_command: Option<String>,
    pub max_debate_rounds: Option<u32>,
    /// Replaces the default mapping wholesale when present.
    pub data_vendors: Option<BTreeMap<String, String>>,
    pub vendor_fallbacks: Option<BTreeMap<String, Vec<String>>>,
    pub vendor_commands: Option<BTreeMap<String, Vec<String>>>,
    pub selected_analysts: Option<Vec<String>>,
    pub memory_top_k: Option<usize>,
    pub model_retries: Option<u32>,
    pub vendor_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    pub model_timeout_seconds: Option<u64>,
    pub snapshot_cache_ttl_seconds: Option<u64>,
    pub memory_path: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub local_data_path: Option<PathBuf>,
}

impl FileConfig {
    /// Apply the file's overrides to the default builder.
    pub fn into_builder(self) -> Result<ConfigBuilder, ConfigError> {
        let mut builder = ConfigBuilder::default();

        if let Some(provider) = self.llm_provider {
            builder = builder.llm_provider(provider.parse()?);
        }
        if let Some(model) = self.deep_think_llm {
            builder = builder.deep_think_llm(model);
        }
        if let Some(model) = self.quick_think_llm {
            builder = builder.quick_think_llm(model);
        }
        if self.backend_url.is_some() {
            builder = builder.backend_url(self.backend_url);
        }
        if let Some(program) = self.llm_command {
            builder = builder.llm_command(program);
        }
        if let Some(rounds) = self.max_debate_rounds {
            builder = builder.max_debate_rounds(rounds);
        }
        if let Some(vendors) = self.data_vendors {
            let mut mapping = BTreeMap::new();
            for (category, vendor) in vendors {
                mapping.insert(category.parse()?, vendor.parse()?);
            }
            builder = builder.data_vendors(mapping);
        }
        if let Some(fallbacks) = self.vendor_fallbacks {
            for (category, vendors) in fallbacks {
                let vendors = vendors
                    .iter()
                    .map(|v| v.parse())
                    .collect::<Result<Vec<VendorId>, _>>()?;
                builder = builder.vendor_fallbacks(category.parse()?, vendors);
            }
        }
        if let Some(commands) = self.vendor_commands {
            for (vendor, argv) in commands {
                builder = builder.vendor_command(vendor.parse()?, argv);
            }
        }
        if let Some(analysts) = self.selected_analysts {
            let analysts = analysts
                .iter()
                .map(|a| a.parse())
                .collect::<Result<Vec<AnalystKind>, _>>()?;
            builder = builder.selected_analysts(analysts);
        }
        if let Some(k) = self.memory_top_k {
            builder = builder.memory_top_k(k);
        }
        if let Some(retries) = self.model_retries {
            builder = builder.model_retries(retries);
        }
        if let Some(retries) = self.vendor_retries {
            builder = builder.vendor_retries(retries);
        }
        if let Some(ms) = self.retry_backoff_ms {
            builder = builder.retry_backoff_ms(ms);
        }
        if let Some(seconds) = self.model_timeout_seconds {
            builder = builder.model_timeout_seconds(seconds);
        }
        if let Some(seconds) = self.snapshot_cache_ttl_seconds {
            builder = builder.snapshot_cache_ttl_seconds(seconds);
        }
        if self.memory_path.is_some() {
            builder = builder.memory_path(self.memory_path);
        }
        if self.results_dir.is_some() {
            builder = builder.results_dir(self.results_dir);
        }
        if self.local_data_path.is_some() {
            builder = builder.local_data_path(self.local_data_path);
        }

        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Configuration::builder().build().unwrap();
        assert_eq!(config.llm_provider(), LlmProvider::OpenAi);
        assert_eq!(config.deep_think_llm(), "o4-mini");
        assert_eq!(config.quick_think_llm(), "gpt-4o-mini");
        assert_eq!(config.max_debate_rounds(), 1);
        assert_eq!(
            config.vendor_for(DataCategory::FundamentalData),
            VendorId::AlphaVantage
        );
        assert_eq!(config.selected_analysts().len(), 3);
    }

    #[test]
    fn zero_debate_rounds_rejected() {
        let result = Configuration::builder().max_debate_rounds(0).build();
        assert_eq!(result, Err(ConfigError::InvalidDebateRounds(0)));
    }

    #[test]
    fn string_overrides_like_a_dictionary() {
        let config = ConfigBuilder::default()
            .set("llm_provider", "deepseek")
            .unwrap()
            .set("deep_think_llm", "deepseek-chat")
            .unwrap()
            .set("backend_url", "https://api.deepseek.com/v1")
            .unwrap()
            .set("max_debate_rounds", "3")
            .unwrap()
            .set("data_vendors.news_data", "google")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.llm_provider(), LlmProvider::DeepSeek);
        assert_eq!(config.deep_think_llm(), "deepseek-chat");
        assert_eq!(config.backend_url(), Some("https://api.deepseek.com/v1"));
        assert_eq!(config.max_debate_rounds(), 3);
        assert_eq!(config.vendor_for(DataCategory::NewsData), VendorId::Google);
    }

    #[test]
    fn unknown_key_rejected() {
        let result = ConfigBuilder::default().set("max_debate_round", "2");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownKey("max_debate_round".to_string())
        );
    }

    #[test]
    fn unknown_vendor_rejected() {
        let result = ConfigBuilder::default().set("data_vendors.core_stock_apis", "bloomberg");
        assert_eq!(
            result.unwrap_err(),
            ConfigError::UnknownVendor("bloomberg".to_string())
        );
    }

    #[test]
    fn unknown_provider_rejected() {
        let result = ConfigBuilder::default().set("llm_provider", "mistral");
        assert!(matches!(result, Err(ConfigError::UnknownProvider(_))));
    }

    #[test]
    fn vendor_must_fit_category() {
        let result = Configuration::builder()
            .data_vendor(DataCategory::CoreStockApis, VendorId::Google)
            .build();
        assert_eq!(
            result,
            Err(ConfigError::VendorNotAllowed {
                category: DataCategory::CoreStockApis,
                vendor: VendorId::Google,
            })
        );
    }

    #[test]
    fn unset_category_fails_closed() {
        let partial = BTreeMap::from([
            (DataCategory::CoreStockApis, VendorId::YFinance),
            (DataCategory::TechnicalIndicators, VendorId::YFinance),
            (DataCategory::FundamentalData, VendorId::Local),
        ]);
        let result = Configuration::builder().data_vendors(partial).build();
        assert_eq!(
            result,
            Err(ConfigError::MissingVendor(DataCategory::NewsData))
        );
    }

    #[test]
    fn fallback_chain_deduplicates_primary() {
        let config = Configuration::builder()
            .vendor_fallbacks(
                DataCategory::CoreStockApis,
                vec![VendorId::YFinance, VendorId::Local],
            )
            .build()
            .unwrap();
        assert_eq!(
            config.vendor_chain(DataCategory::CoreStockApis),
            vec![VendorId::YFinance, VendorId::Local]
        );
        assert_eq!(
            config.referenced_vendors(),
            vec![VendorId::YFinance, VendorId::AlphaVantage, VendorId::Local]
        );
    }

    #[test]
    fn empty_analyst_selection_rejected() {
        let result = Configuration::builder().selected_analysts(vec![]).build();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn required_categories_follow_analysts() {
        let config = Configuration::builder()
            .selected_analysts(vec![AnalystKind::News, AnalystKind::News])
            .build()
            .unwrap();
        assert_eq!(config.selected_analysts(), &[AnalystKind::News]);
        assert_eq!(config.required_categories(), vec![DataCategory::NewsData]);
    }

    #[test]
    fn retry_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn to_builder_roundtrips() {
        let config = Configuration::builder()
            .max_debate_rounds(4)
            .memory_top_k(5)
            .build()
            .unwrap();
        let rebuilt = config.to_builder().build().unwrap();
        assert_eq!(config, rebuilt);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
llm_provider = "anthropic"
deep_think_llm = "claude-sonnet-4-5"
quick_think_llm = "claude-3-5-haiku-latest"
max_debate_rounds = 2
selected_analysts = ["market", "news"]

[data_vendors]
core_stock_apis = "local"
technical_indicators = "local"
fundamental_data = "local"
news_data = "local"

[vendor_commands]
yfinance = ["python3", "scripts/yfinance_vendor.py"]
"#;
        let file: FileConfig = toml::from_str(toml_str).unwrap();
        let config = file.into_builder().unwrap().build().unwrap();
        assert_eq!(config.llm_provider(), LlmProvider::Anthropic);
        assert_eq!(config.max_debate_rounds(), 2);
        assert_eq!(config.vendor_for(DataCategory::NewsData), VendorId::Local);
        assert_eq!(
            config.vendor_command(VendorId::YFinance).unwrap()[0],
            "python3"
        );
    }

    #[test]
    fn toml_unknown_key_rejected() {
        let toml_str = r#"
max_debate_rouns = 2
"#;
        let result: Result<FileConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn toml_partial_vendor_table_fails_closed() {
        let toml_str = r#"
[data_vendors]
core_stock_apis = "yfinance"
"#;
        let file: FileConfig = toml::from_str(toml_str).unwrap();
        let result = file.into_builder().unwrap().build();
        assert!(matches!(result, Err(ConfigError::MissingVendor(_))));
    }

    #[test]
    fn toml_unknown_vendor_is_config_error() {
        let toml_str = r#"
[data_vendors]
core_stock_apis = "quandl"
technical_indicators = "yfinance"
fundamental_data = "local"
news_data = "local"
"#;
        let file: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            file.into_builder().unwrap_err(),
            ConfigError::UnknownVendor("quandl".to_string())
        );
    }
}
