use serde::{Deserialize, Serialize};

/// Top-level configuration for TRIAD.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriadConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
    #[serde(default)]
    pub roster: RosterConfig,
}

/// Configuration for the snapshot/data layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    /// Path to the company snapshot SQLite database (written by the ingest
    /// pipeline, read by TRIAD).
    pub snapshot_path: String,
    /// Path to the run-history SQLite database (written by TRIAD).
    pub run_store_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// TTL in seconds for moka entries.
    pub memory_ttl_seconds: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "data/triad_snapshots.db".to_string(),
            run_store_path: "data/triad_runs.db".to_string(),
            memory_max_capacity: 1_024,
            memory_ttl_seconds: 300,
        }
    }
}

/// Model selection and timeouts for the Claude CLI backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Default model for layer-1/layer-2 analysts.
    pub analyst_model: String,
    /// Model for the fund manager synthesis call.
    pub synthesis_model: String,
    /// Model for the CEO review call.
    pub oversight_model: String,
    /// Per-analyst call timeout in seconds.
    pub analyst_timeout_seconds: u64,
    /// Timeout for the single-agent synthesis and oversight calls.
    pub synthesis_timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            analyst_model: "claude-3-5-haiku-latest".to_string(),
            synthesis_model: "claude-sonnet-4-5-20250929".to_string(),
            oversight_model: "claude-sonnet-4-5-20250929".to_string(),
            analyst_timeout_seconds: 90,
            synthesis_timeout_seconds: 120,
        }
    }
}

/// Knobs for the convergence detector and the loop ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConvergenceConfig {
    /// Hard ceiling on loop iterations. Dominates every heuristic.
    pub max_loops: u32,
    /// Consecutive loops with identical ordered tickers for perfect match.
    pub perfect_match_loops: usize,
    /// Consecutive loops with the same ticker set for set stability.
    pub set_stability_loops: usize,
    /// Max per-position score change, as a fraction of the 0-100 scale
    /// (0.05 = 5 points).
    pub score_threshold: f64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            max_loops: 5,
            perfect_match_loops: 2,
            set_stability_loops: 3,
            score_threshold: 0.05,
        }
    }
}

/// Analytical slant of a layer-2 analyst; decides which specialty score the
/// agent stamps onto its picks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Fundamental,
    Technical,
    Risk,
}

/// Configuration for a single analyst agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub id: String,
    pub name: String,
    /// Override system prompt. Falls back to the built-in prompt for the id.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Sectors (layer 1) or analytical specialties (layer 2) this analyst
    /// describes itself as covering; prompt content only.
    #[serde(default)]
    pub focus: Vec<String>,
    /// Coverage universe tickers. Only meaningful for layer 1; layer 2 gets
    /// its candidates from layer-1 output.
    #[serde(default)]
    pub coverage: Vec<String>,
    #[serde(default)]
    pub specialty: Option<Specialty>,
    /// Override model for this analyst. Falls back to `LlmConfig::analyst_model`.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Configuration for a single-agent layer (fund manager, CEO).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadConfig {
    pub name: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// The full agent roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterConfig {
    #[serde(default = "default_layer1")]
    pub layer1: Vec<AnalystConfig>,
    #[serde(default = "default_layer2")]
    pub layer2: Vec<AnalystConfig>,
    #[serde(default = "default_fund_manager")]
    pub fund_manager: LeadConfig,
    #[serde(default = "default_ceo")]
    pub ceo: LeadConfig,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            layer1: default_layer1(),
            layer2: default_layer2(),
            fund_manager: default_fund_manager(),
            ceo: default_ceo(),
        }
    }
}

fn analyst(id: &str, name: &str, focus: &[&str], coverage: &[&str]) -> AnalystConfig {
    AnalystConfig {
        id: id.to_string(),
        name: name.to_string(),
        system_prompt: None,
        focus: focus.iter().map(|s| s.to_string()).collect(),
        coverage: coverage.iter().map(|s| s.to_string()).collect(),
        specialty: None,
        model: None,
        enabled: true,
    }
}

fn default_layer1() -> Vec<AnalystConfig> {
    vec![
        analyst(
            "alpha",
            "Elena Vasquez",
            &["AI infrastructure", "Semiconductors"],
            &[
                "NVDA", "AMD", "AVGO", "TSM", "ASML", "MRVL", "MU", "ARM", "SMCI", "VRT", "ANET",
                "DELL", "QCOM",
            ],
        ),
        analyst(
            "beta",
            "David Kim",
            &["Cloud platforms", "Enterprise software"],
            &[
                "MSFT", "GOOGL", "AMZN", "ORCL", "CRM", "NOW", "SNOW", "DDOG", "MDB", "PLTR",
                "NET", "CRWD", "PANW",
            ],
        ),
        analyst(
            "gamma",
            "Priya Sharma",
            &["AI applications", "Vertical software"],
            &[
                "TSLA", "ISRG", "DXCM", "VEEV", "ADBE", "INTU", "ADSK", "WDAY", "AAPL", "SPOT",
                "SYM", "PATH", "ABNB", "UBER", "DASH", "ROK", "HON",
            ],
        ),
    ]
}

fn default_layer2() -> Vec<AnalystConfig> {
    let mut delta = analyst(
        "delta",
        "James O'Connor",
        &["Fundamental quality", "Valuation"],
        &[],
    );
    delta.specialty = Some(Specialty::Fundamental);

    let mut epsilon = analyst(
        "epsilon",
        "Mei Tanaka",
        &["Technicals", "Momentum"],
        &[],
    );
    epsilon.specialty = Some(Specialty::Technical);

    let mut zeta = analyst("zeta", "Anders Holm", &["Risk", "Bear cases"], &[]);
    zeta.specialty = Some(Specialty::Risk);

    vec![delta, epsilon, zeta]
}

fn default_fund_manager() -> LeadConfig {
    LeadConfig {
        name: "Victoria Chen".to_string(),
        system_prompt: None,
        model: None,
    }
}

fn default_ceo() -> LeadConfig {
    LeadConfig {
        name: "Robert Hayes".to_string(),
        system_prompt: None,
        model: None,
    }
}
