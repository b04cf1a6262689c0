use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, warn};
use triad_models::{CompanyRecord, DataQuality};

use crate::error::DataError;
use crate::memory::MemoryCache;
use crate::snapshot::SnapshotReader;

/// Read-through company-data aggregator: moka (hot) → SQLite (shared) →
/// placeholder.
///
/// On a SQLite hit the record is promoted to the moka hot cache. An
/// individual ticker never fails: a missing, expired, or corrupt row
/// degrades to a `CompanyRecord::placeholder`, so agents always receive a
/// structurally valid record per ticker.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection`
/// is not `Sync`.
pub struct DataAggregator {
    memory: MemoryCache,
    sqlite: Mutex<SnapshotReader>,
}

impl DataAggregator {
    pub fn new(sqlite: SnapshotReader, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: MemoryCache::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Fetch records for a set of tickers. Infallible per ticker: every
    /// requested ticker is present in the result map.
    pub async fn get_batch_data(&self, tickers: &[String]) -> BTreeMap<String, CompanyRecord> {
        let mut records = BTreeMap::new();
        for ticker in tickers {
            let record = match self.get_record(ticker).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!(ticker = %ticker, "No live snapshot row");
                    CompanyRecord::placeholder(ticker, "no snapshot row")
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Snapshot read failed");
                    CompanyRecord::placeholder(ticker, &format!("snapshot read failed: {e}"))
                }
            };
            records.insert(ticker.clone(), record);
        }
        records
    }

    /// Get a single company record. Checks moka first, then SQLite
    /// (TTL filtering happens in the query). Promotes SQLite hits to moka.
    pub async fn get_record(&self, ticker: &str) -> Result<Option<CompanyRecord>, DataError> {
        if let Some(json) = self.memory.get(ticker).await {
            return Ok(Some(serde_json::from_str(&json)?));
        }

        let row = {
            let sqlite = self
                .sqlite
                .lock()
                .map_err(|e| DataError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
            sqlite.get(ticker)?
        };

        if let Some(row) = row {
            self.memory
                .insert(ticker.to_string(), row.record_json.clone())
                .await;
            return Ok(Some(serde_json::from_str(&row.record_json)?));
        }

        Ok(None)
    }

    /// Number of entries in the hot moka cache.
    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

/// Render a company record as the text block agents consume.
pub fn data_summary(record: &CompanyRecord) -> String {
    let mut lines: Vec<String> = vec![
        format!("# {} ({})", record.company_name, record.ticker),
        format!("Data Quality: {}", quality_label(record.quality)),
    ];
    if !record.sources_used.is_empty() {
        lines.push(format!("Sources: {}", record.sources_used.join(", ")));
    }
    lines.push(String::new());

    if let Some(profile) = &record.profile {
        lines.push("## Company Profile".to_string());
        lines.push(format!("Sector: {}", profile.sector));
        lines.push(format!("Industry: {}", profile.industry));
        if let Some(employees) = profile.employees {
            lines.push(format!("Employees: {employees}"));
        }
        lines.push(String::new());
    }

    if let Some(fin) = &record.financials {
        lines.push("## Financial Metrics".to_string());
        if let Some(market_cap) = fin.market_cap {
            lines.push(format!("Market Cap: ${market_cap}"));
        }
        if let Some(pe) = fin.pe_ratio {
            lines.push(format!("P/E Ratio: {pe:.2}"));
        }
        if let Some(fpe) = fin.forward_pe {
            lines.push(format!("Forward P/E: {fpe:.2}"));
        }
        if let Some(peg) = fin.peg_ratio {
            lines.push(format!("PEG Ratio: {peg:.2}"));
        }
        if let Some(margin) = fin.profit_margin {
            lines.push(format!("Profit Margin: {:.1}%", margin * 100.0));
        }
        if let Some(roe) = fin.return_on_equity {
            lines.push(format!("ROE: {:.1}%", roe * 100.0));
        }
        if let Some(growth) = fin.revenue_growth {
            lines.push(format!("Revenue Growth: {:.1}%", growth * 100.0));
        }
        if let Some(de) = fin.debt_to_equity {
            lines.push(format!("Debt/Equity: {de:.2}"));
        }
        lines.push(String::new());
    }

    if let Some(price) = &record.price {
        lines.push("## Price Data".to_string());
        lines.push(format!("Current Price: ${}", price.last_price));
        if let Some(change) = price.change_1d_pct {
            lines.push(format!("1-Day Change: {change:+.2}%"));
        }
        if let Some(sma) = price.sma_50 {
            lines.push(format!("50-Day SMA: ${sma}"));
        }
        if let Some(sma) = price.sma_200 {
            lines.push(format!("200-Day SMA: ${sma}"));
        }
        if let Some(rsi) = price.rsi_14 {
            lines.push(format!("RSI (14): {rsi:.1}"));
        }
        lines.push(String::new());
    }

    if !record.news.is_empty() {
        lines.push("## Recent News".to_string());
        for headline in record.news.iter().take(5) {
            lines.push(format!("- {} ({})", headline.title, headline.source));
        }
        lines.push(String::new());
    }

    if record.quality == DataQuality::Placeholder {
        lines.push(format!(
            "NOTE: no usable data for {}; treat with low confidence.",
            record.ticker
        ));
    }

    lines.join("\n").trim_end().to_string()
}

fn quality_label(quality: DataQuality) -> &'static str {
    match quality {
        DataQuality::Full => "full",
        DataQuality::Partial => "partial",
        DataQuality::Placeholder => "placeholder",
        DataQuality::Unknown => "unknown",
    }
}
