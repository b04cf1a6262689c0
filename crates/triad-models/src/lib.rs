pub mod config;
pub mod decision;
pub mod market;
pub mod payload;
pub mod pick;
pub mod run;
pub mod wire;

pub use config::{
    AnalystConfig, ConvergenceConfig, DataConfig, LeadConfig, LlmConfig, RosterConfig, Specialty,
    TriadConfig,
};
pub use decision::{CeoDecision, CeoOutput, CeoVerdict};
pub use market::{
    CompanyProfile, CompanyRecord, DataQuality, FinancialSnapshot, NewsHeadline, PriceSnapshot,
    SnapshotRow, SNAPSHOT_TABLE_DDL,
};
pub use payload::{CompanyBrief, ResearchPayload};
pub use pick::{AgentLayer, AgentOutput, StockPick, TokenUsage};
pub use run::{
    ConvergenceReason, ConvergenceResult, LoopIteration, ResearchRun, RunStatus,
};
pub use wire::{OversightItem, OversightResponse, PicksResponse, SynthesisResponse};
