use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::market::{DataQuality, FinancialSnapshot, PriceSnapshot};
use crate::pick::AgentOutput;

/// Per-company slice of a layer payload: the rendered text summary plus the
/// structured detail layer-2 agents get to see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyBrief {
    pub summary: String,
    pub quality: DataQuality,
    #[serde(default)]
    pub financials: Option<FinancialSnapshot>,
    #[serde(default)]
    pub price: Option<PriceSnapshot>,
}

/// Shared input for one layer's agents. Built once per layer by the executor
/// and handed to every agent of that layer, so the batch fetch happens once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchPayload {
    pub companies: BTreeMap<String, CompanyBrief>,
    pub market_context: String,
    /// Full outputs of the previous layer. Empty for layer 1; layer-2 agents
    /// use it to judge cross-analyst agreement and crowding.
    #[serde(default)]
    pub upstream: Vec<AgentOutput>,
}

impl ResearchPayload {
    /// Tickers in this layer's candidate universe, in map order.
    pub fn tickers(&self) -> Vec<String> {
        self.companies.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tickers_are_sorted_map_keys() {
        let mut companies = BTreeMap::new();
        for ticker in ["MSFT", "AAPL", "NVDA"] {
            companies.insert(
                ticker.to_string(),
                CompanyBrief {
                    summary: format!("# {ticker}"),
                    quality: DataQuality::Full,
                    financials: None,
                    price: None,
                },
            );
        }
        let payload = ResearchPayload {
            companies,
            market_context: "calm tape".to_string(),
            upstream: vec![],
        };

        assert_eq!(payload.tickers(), vec!["AAPL", "MSFT", "NVDA"]);
    }
}
