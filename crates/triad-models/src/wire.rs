//! JSON contracts parsed from model output.
//!
//! Each response type mirrors the example schema embedded in the matching
//! prompt. Optional fields default so a terse model response still parses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decision::CeoVerdict;
use crate::pick::StockPick;

/// An analyst's picks for one layer pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PicksResponse {
    pub picks: Vec<StockPick>,
    #[serde(default)]
    pub reasoning: String,
}

/// The fund manager's synthesis of layer-2 output into a Top-3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesisResponse {
    pub top3: Vec<StockPick>,
    #[serde(default)]
    pub synthesis_reasoning: String,
    #[serde(default)]
    pub excluded_companies: Vec<String>,
    #[serde(default)]
    pub exclusion_reasons: BTreeMap<String, String>,
}

/// One position's verdict as emitted by the CEO model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OversightItem {
    pub position: u8,
    pub decision: CeoVerdict,
    #[serde(default)]
    pub rationale: String,
}

/// The CEO model's full response for one review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OversightResponse {
    pub decisions: Vec<OversightItem>,
    #[serde(default)]
    pub stability_assessment: String,
}
