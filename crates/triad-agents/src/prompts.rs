use triad_models::{AgentOutput, ResearchPayload, Specialty, StockPick};

/// Example pick object embedded in every picks-producing prompt.
fn pick_schema() -> serde_json::Value {
    serde_json::json!({
        "ticker": "<symbol>",
        "company_name": "<name>",
        "conviction_score": 75,
        "thesis": "<2-4 sentence investment thesis>",
        "key_risks": ["<risk>"],
        "catalysts": ["<upcoming catalyst>"],
        "target_price_rationale": "<optional>"
    })
}

/// Schema description included in analyst system prompts.
fn picks_response_schema() -> String {
    let example = serde_json::json!({
        "picks": [pick_schema()],
        "reasoning": "<overall reasoning across your picks>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn synthesis_response_schema() -> String {
    let example = serde_json::json!({
        "top3": [pick_schema()],
        "synthesis_reasoning": "<why these three>",
        "excluded_companies": ["<ticker>"],
        "exclusion_reasons": {"<ticker>": "<why it missed the cut>"}
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn oversight_response_schema() -> String {
    let example = serde_json::json!({
        "decisions": [
            {"position": 1, "decision": "KEEP", "rationale": "<why>"},
            {"position": 2, "decision": "SWAP", "rationale": "<why>"},
            {"position": 3, "decision": "KEEP", "rationale": "<why>"}
        ],
        "stability_assessment": "<one paragraph on portfolio stability>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

/// Default system prompt for a layer-1 primary analyst.
pub fn layer1_system_prompt(name: &str, focus: &[String]) -> String {
    format!(
        "You are {name}, a primary research analyst on an AI-focused equity research desk. \
         Your coverage: {focus}.\n\n\
         You receive per-company data summaries (profile, financial metrics, price data, \
         recent news) plus a market context note. Surface the strongest ideas in your \
         coverage with a 0-100 conviction score each. Be opinionated; differentiation \
         between picks matters more than hedged language. Score conviction on the strength \
         of evidence in the data you were given, not on general priors.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n{schema}",
        name = name,
        focus = focus.join(", "),
        schema = picks_response_schema(),
    )
}

/// Default system prompt for a layer-2 secondary analyst.
pub fn layer2_system_prompt(name: &str, focus: &[String], specialty: Option<Specialty>) -> String {
    let lens = match specialty {
        Some(Specialty::Fundamental) => {
            "Stress-test each candidate's fundamentals: quality of growth, margins, \
             balance sheet, and valuation versus its own history."
        }
        Some(Specialty::Technical) => {
            "Judge each candidate's price structure and momentum: trend, relative \
             strength, and whether the entry is extended."
        }
        Some(Specialty::Risk) => {
            "Attack each candidate: concentration, crowding, regulatory exposure, and \
             the credible bear case. Reward asymmetry, punish fragility."
        }
        None => "Deepen the analysis of each candidate with your own lens.",
    };

    format!(
        "You are {name}, a secondary analyst on an AI-focused equity research desk. \
         Your specialties: {focus}.\n\n\
         You receive the primary analysts' full output plus detailed data for the \
         candidate universe they surfaced. Analyze ONLY tickers from that candidate \
         universe; do not introduce new names. {lens} Note where primary analysts agree \
         or crowd into the same idea.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n{schema}",
        name = name,
        focus = focus.join(", "),
        lens = lens,
        schema = picks_response_schema(),
    )
}

/// Default system prompt for the fund manager (layer 3).
pub fn fund_manager_system_prompt(name: &str) -> String {
    format!(
        "You are {name}, the fund manager of an AI-focused equity research desk. \
         Your secondary analysts each hand you their ranked picks with fundamental, \
         technical, and risk scoring. Synthesize them into exactly three positions: \
         the Top 3 the desk would put capital behind today. Weigh cross-analyst \
         agreement, penalize picks only one analyst likes, and respect the risk \
         analyst's vetoes. For each pick suggest position sizing (1-5% of book). \
         Explain what you excluded and why.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n{schema}",
        name = name,
        schema = synthesis_response_schema(),
    )
}

/// Default system prompt for the CEO (layer 4).
pub fn ceo_system_prompt(name: &str) -> String {
    format!(
        "You are {name}, CEO of an equity research firm. Each research loop, your fund \
         manager proposes a Top 3. Your job is stability: compare the proposal against \
         the previous loop's Top 3 position by position and decide KEEP (carry the \
         previous pick forward) or SWAP (accept the new proposal). Churn is costly. \
         Only SWAP if there's a compelling reason - a conviction delta greater than \
         about 15 points, or material new information. Explain every decision.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n{schema}",
        name = name,
        schema = oversight_response_schema(),
    )
}

/// User message for a layer-1 or layer-2 picks request.
pub fn picks_request(payload: &ResearchPayload, num_picks: usize) -> String {
    let mut sections: Vec<String> = vec![format!(
        "Based on the following market data and your expertise, provide your top {num_picks} \
         stock picks with conviction scores, thesis, risks, and catalysts."
    )];

    sections.push(format!("## Market Context\n{}", payload.market_context));

    if !payload.upstream.is_empty() {
        let upstream: Vec<serde_json::Value> = payload
            .upstream
            .iter()
            .map(|o| {
                serde_json::json!({
                    "agent_id": o.agent_id,
                    "agent_name": o.agent_name,
                    "picks": o.picks,
                    "reasoning": o.reasoning,
                })
            })
            .collect();
        sections.push(format!(
            "## Primary Analyst Output\n{}",
            serde_json::to_string_pretty(&upstream).unwrap_or_default()
        ));
    }

    let mut companies = String::from("## Companies\n");
    for brief in payload.companies.values() {
        companies.push_str(&brief.summary);
        companies.push_str("\n\n");
    }
    sections.push(companies.trim_end().to_string());

    sections.join("\n\n")
}

/// User message for the fund manager synthesis request.
pub fn synthesis_request(upstream: &[AgentOutput]) -> String {
    let outputs: Vec<serde_json::Value> = upstream
        .iter()
        .map(|o| {
            serde_json::json!({
                "agent_id": o.agent_id,
                "agent_name": o.agent_name,
                "picks": o.picks,
                "reasoning": o.reasoning,
            })
        })
        .collect();

    format!(
        "Synthesize the following inputs from your analysts into a final Top 3.\n\n\
         Secondary Analyst Outputs:\n{}\n\n\
         Create your final Top 3 picks, explaining:\n\
         1. Why each made the cut\n\
         2. What was excluded and why\n\
         3. Suggested position sizing",
        serde_json::to_string_pretty(&outputs).unwrap_or_default()
    )
}

/// User message for the CEO review on iterations >= 2.
///
/// The swap threshold here is advisory prompt content only; nothing in the
/// deterministic decision code enforces it.
pub fn oversight_request(
    previous: &[StockPick],
    proposed: &[StockPick],
    loop_number: u32,
) -> String {
    format!(
        "This is loop {loop_number}.\n\n\
         Previous Top 3:\n{previous}\n\n\
         Proposed Top 3:\n{proposed}\n\n\
         For each position, decide whether to KEEP the previous pick or SWAP to the new \
         proposed pick.\n\
         Remember: Only SWAP if there's a compelling reason (>15 point conviction delta \
         or material new information).",
        loop_number = loop_number,
        previous = serde_json::to_string_pretty(previous).unwrap_or_default(),
        proposed = serde_json::to_string_pretty(proposed).unwrap_or_default(),
    )
}
