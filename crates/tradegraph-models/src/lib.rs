pub mod config;
pub mod debate;
pub mod decision;
pub mod memory;
pub mod opinion;
pub mod snapshot;

pub use config::{
    AnalystKind, ConfigBuilder, ConfigError, Configuration, DataCategory, DataVendors, FileConfig,
    LlmProvider, RetryPolicy, VendorId,
};
pub use debate::{DebatePhase, DebateState, DebateTurn, DebateViolation, ResearchThesis};
pub use decision::{Action, AuditTrail, Decision};
pub use memory::{MemoryKey, MemoryRecord, Precedent, RealizedOutcome};
pub use opinion::{AgentOpinion, AgentRole, ModelTier, RiskStance, Stance, StanceAssessment};
pub use snapshot::{
    CategoryData, CategoryPayload, Fundamentals, IndicatorPoint, MarketSnapshot, NewsItem,
    PriceBar, Provenance,
};
