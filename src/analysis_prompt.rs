use serde_json::{Value, json};

use crate::command::AnalysisSource;

pub const CSV_SAMPLE_CHARS: usize = 5000;

const REQUIRED_FIELDS: [&str; 6] = [
    "keyword",
    "searchVolume",
    "cpc",
    "keywordDifficulty",
    "currentPreStaked",
    "opportunityScore",
];

pub fn build_niche_prompt(niche: &str) -> String {
    let niche = niche.trim();
    let mut data = String::new();
    data.push_str(&format!(
        "Analyze the niche \"{niche}\" for Presearch keyword staking opportunities.\n"
    ));
    data.push_str("Generate 15-20 specific, high-intent keywords relevant to this niche.\n\n");
    data.push_str(
        "For each keyword, ESTIMATE the following based on general SEO knowledge (simulating Ahrefs data):\n",
    );
    data.push_str("1. Search Volume (monthly).\n");
    data.push_str("2. CPC (Cost Per Click in USD).\n");
    data.push_str("3. Keyword Difficulty (0-100).\n\n");
    data.push_str(
        "Then, ESTIMATE the current Presearch staking environment (simulating Presearch API data):\n",
    );
    data.push_str(
        "1. Current PRE Staked (amount of tokens staked, usually between 100 and 100,000).\n",
    );
    data.push_str(
        "2. Whether it is likely \"Available\" (low competition) or \"Taken\" (high competition).\n\n",
    );
    data.push_str("Calculate an \"Opportunity Score\" (0-100) where high volume + high CPC + low difficulty + low current staked = High Score.\n\n");
    data.push_str("Return the data as a JSON array.");
    data
}

pub fn build_csv_prompt(csv_text: &str) -> String {
    let sample = truncate_chars(csv_text, CSV_SAMPLE_CHARS);
    let mut data = String::new();
    data.push_str("I have a CSV export of SEO keywords (Source: Ahrefs/SEMrush).\n\n");
    data.push_str("CSV Content (truncated sample):\n");
    data.push_str(sample);
    data.push_str("\n\nTask:\n");
    data.push_str("1. Parse this CSV data.\n");
    data.push_str("2. For the top 15 keywords found, add simulated Presearch Staking data (Current PRE Staked, Availability).\n");
    data.push_str("3. Calculate an Opportunity Score based on Volume/CPC vs Competition.\n\n");
    data.push_str("Return a JSON array of objects matching the schema.");
    data
}

/// Structured output schema in the Gemini `responseSchema` dialect.
///
/// Niche generation pins the metric fields as required; CSV enrichment leaves
/// every field optional because the export may not carry all of them.
pub fn response_schema(source: AnalysisSource) -> Value {
    let mut item = json!({
        "type": "OBJECT",
        "properties": {
            "keyword": { "type": "STRING" },
            "searchVolume": { "type": "INTEGER" },
            "cpc": { "type": "NUMBER" },
            "keywordDifficulty": { "type": "INTEGER" },
            "currentPreStaked": { "type": "INTEGER" },
            "isAvailable": { "type": "BOOLEAN" },
            "opportunityScore": { "type": "INTEGER" },
            "topStaker": { "type": "STRING" },
            "category": { "type": "STRING" }
        }
    });
    if source == AnalysisSource::AiGenerated {
        if let Some(obj) = item.as_object_mut() {
            obj.insert("required".to_string(), json!(REQUIRED_FIELDS));
        }
        if let Some(top_staker) = item.pointer_mut("/properties/topStaker") {
            top_staker["description"] = json!("A simulated username of the top staker");
        }
    }
    json!({
        "type": "ARRAY",
        "items": item,
    })
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
