use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How complete the aggregated record for a company is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    /// All configured sources contributed.
    Full,
    /// At least one source failed or was stale.
    Partial,
    /// Nothing usable; the record is a synthesized stand-in.
    Placeholder,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyProfile {
    pub sector: String,
    pub industry: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub employees: Option<u64>,
}

/// Fundamental metrics. Ratios are plain floats; dollar amounts are Decimal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinancialSnapshot {
    #[serde(default)]
    pub market_cap: Option<Decimal>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub forward_pe: Option<f64>,
    #[serde(default)]
    pub peg_ratio: Option<f64>,
    #[serde(default)]
    pub profit_margin: Option<f64>,
    #[serde(default)]
    pub return_on_equity: Option<f64>,
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    #[serde(default)]
    pub debt_to_equity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSnapshot {
    pub last_price: Decimal,
    #[serde(default)]
    pub change_1d_pct: Option<f64>,
    #[serde(default)]
    pub sma_50: Option<Decimal>,
    #[serde(default)]
    pub sma_200: Option<Decimal>,
    #[serde(default)]
    pub rsi_14: Option<f64>,
    #[serde(default)]
    pub high_52w: Option<Decimal>,
    #[serde(default)]
    pub low_52w: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsHeadline {
    pub title: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    /// -1.0 (bearish) to +1.0 (bullish), when the pipeline scored it.
    #[serde(default)]
    pub sentiment: Option<f64>,
}

/// Aggregated data for one company, as written to the snapshot database by
/// the ingest pipeline and read back by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyRecord {
    pub ticker: String,
    pub company_name: String,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub profile: Option<CompanyProfile>,
    #[serde(default)]
    pub financials: Option<FinancialSnapshot>,
    #[serde(default)]
    pub price: Option<PriceSnapshot>,
    #[serde(default)]
    pub news: Vec<NewsHeadline>,
    #[serde(default)]
    pub sources_used: Vec<String>,
    #[serde(default)]
    pub sources_failed: Vec<String>,
    pub quality: DataQuality,
}

impl CompanyRecord {
    /// Stand-in record for a ticker the snapshot store couldn't serve.
    /// Downstream consumers always get a structurally valid record.
    pub fn placeholder(ticker: &str, reason: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            company_name: ticker.to_string(),
            as_of: Utc::now(),
            profile: None,
            financials: None,
            price: None,
            news: Vec::new(),
            sources_used: Vec::new(),
            sources_failed: vec![reason.to_string()],
            quality: DataQuality::Placeholder,
        }
    }
}

/// Row shape of the `company_snapshots` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRow {
    pub ticker: String,
    /// Serialized `CompanyRecord`.
    pub record_json: String,
    pub quality: String,
    pub fetched_at: String,
    pub expires_at: String,
}

/// DDL for the snapshot table. The ingest pipeline owns writes; this side
/// only reads (and seeds in-memory databases in tests).
pub const SNAPSHOT_TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS company_snapshots (
    ticker      TEXT PRIMARY KEY,
    record_json TEXT NOT NULL,
    quality     TEXT NOT NULL,
    fetched_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_company_snapshots_expires
    ON company_snapshots (expires_at);
";
