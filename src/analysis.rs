use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::analysis_prompt::{build_csv_prompt, build_niche_prompt, response_schema};
use crate::command::{AnalysisOutcome, AnalysisSource, Command, KeywordOpportunity};

/// Text generation backend asked to fabricate keyword metrics.
///
/// The credential travels with each call because the user may replace it at
/// any time from the settings dialog.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    fn name(&self) -> &str;

    /// Send `prompt` with a structured output `schema` and return the raw reply text.
    async fn generate(&self, api_key: &str, prompt: &str, schema: &Value) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API Key is required")]
    MissingApiKey,

    #[error("AI request failed: {0}")]
    Transport(String),

    #[error("invalid AI response: {0}")]
    InvalidResponse(String),

    #[error("could not read upload: {0}")]
    Upload(String),
}

impl AnalysisError {
    /// Banner text shown to the user; details stay in the log.
    pub fn user_message(&self, source: AnalysisSource) -> &'static str {
        match (self, source) {
            (AnalysisError::MissingApiKey, _) => "API Key is required",
            (AnalysisError::Upload(_), _) => "Failed to parse CSV",
            (_, AnalysisSource::AiGenerated) => {
                "Failed to generate keyword analysis. Please check your API key."
            }
            (_, AnalysisSource::CsvImport) => "Failed to analyze CSV data.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisInput {
    Niche(String),
    CsvFile(PathBuf),
}

impl AnalysisInput {
    pub fn source(&self) -> AnalysisSource {
        match self {
            AnalysisInput::Niche(_) => AnalysisSource::AiGenerated,
            AnalysisInput::CsvFile(_) => AnalysisSource::CsvImport,
        }
    }
}

pub struct Analyzer {
    model: Arc<dyn AnalysisModel>,
}

impl Analyzer {
    pub fn new(model: Arc<dyn AnalysisModel>) -> Self {
        Analyzer { model }
    }

    pub async fn generate_keyword_analysis(
        &self,
        niche: &str,
        api_key: &str,
    ) -> Result<Vec<KeywordOpportunity>, AnalysisError> {
        let prompt = build_niche_prompt(niche);
        self.request(AnalysisSource::AiGenerated, &prompt, api_key)
            .await
    }

    pub async fn analyze_csv_data(
        &self,
        csv_text: &str,
        api_key: &str,
    ) -> Result<Vec<KeywordOpportunity>, AnalysisError> {
        let prompt = build_csv_prompt(csv_text);
        self.request(AnalysisSource::CsvImport, &prompt, api_key)
            .await
    }

    pub async fn analyze(
        &self,
        input: &AnalysisInput,
        api_key: &str,
    ) -> Result<Vec<KeywordOpportunity>, AnalysisError> {
        match input {
            AnalysisInput::Niche(niche) => self.generate_keyword_analysis(niche, api_key).await,
            AnalysisInput::CsvFile(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|err| AnalysisError::Upload(format!("{}: {err}", path.display())))?;
                let text = String::from_utf8_lossy(&bytes);
                self.analyze_csv_data(&text, api_key).await
            }
        }
    }

    async fn request(
        &self,
        source: AnalysisSource,
        prompt: &str,
        api_key: &str,
    ) -> Result<Vec<KeywordOpportunity>, AnalysisError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }
        let schema = response_schema(source);
        let raw = self
            .model
            .generate(api_key, prompt, &schema)
            .await
            .map_err(|err| AnalysisError::Transport(format!("{err:#}")))?;
        let records = parse_opportunities(&raw, source, Utc::now().timestamp_millis())?;
        info!(
            model = self.model.name(),
            source = source.label(),
            records = records.len(),
            "analysis completed"
        );
        Ok(records)
    }
}

/// Run `input` in the background and report the outcome on the command bus.
pub fn spawn_analysis(
    analyzer: Arc<Analyzer>,
    seq: u64,
    input: AnalysisInput,
    api_key: String,
    tx: broadcast::Sender<Command>,
) {
    tokio::spawn(async move {
        let source = input.source();
        let result = analyzer
            .analyze(&input, &api_key)
            .await
            .map_err(|err| {
                error!(seq, source = source.label(), error = %err, "analysis failed");
                err.user_message(source).to_string()
            });
        let _ = tx.send(Command::AnalysisFinished(AnalysisOutcome {
            seq,
            source,
            result,
        }));
    });
}

/// Remove markdown code fences the model sometimes wraps around JSON.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json\n", "")
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parse the model reply into records, injecting `{tag}-{index}-{timestamp}` ids.
///
/// Elements that are not objects or lack a keyword are dropped; numeric fields
/// are clamped into their documented ranges.
pub fn parse_opportunities(
    raw: &str,
    source: AnalysisSource,
    timestamp_ms: i64,
) -> Result<Vec<KeywordOpportunity>, AnalysisError> {
    let cleaned = strip_code_fences(raw);
    let cleaned = if cleaned.is_empty() { "[]" } else { cleaned.as_str() };
    let value = serde_json::from_str::<Value>(cleaned)
        .map_err(|err| AnalysisError::InvalidResponse(format!("JSON parse error: {err}")))?;
    let Value::Array(items) = value else {
        return Err(AnalysisError::InvalidResponse(
            "expected a JSON array of keyword objects".to_string(),
        ));
    };
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if item.is_null() {
            continue;
        }
        let payload = match serde_json::from_value::<OpportunityPayload>(item) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(index, error = %err, "rejecting malformed keyword entry");
                continue;
            }
        };
        let id = format!("{}-{}-{}", source.id_tag(), index, timestamp_ms);
        match payload.into_record(id) {
            Some(record) => records.push(record),
            None => warn!(index, "rejecting keyword entry without a keyword"),
        }
    }
    Ok(records)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpportunityPayload {
    #[serde(default, deserialize_with = "deserialize_text")]
    keyword: Option<String>,
    #[serde(default, deserialize_with = "deserialize_number")]
    search_volume: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number")]
    cpc: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number")]
    keyword_difficulty: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_number")]
    current_pre_staked: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    is_available: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_number")]
    opportunity_score: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_text")]
    top_staker: Option<String>,
    #[serde(default, deserialize_with = "deserialize_text")]
    category: Option<String>,
}

impl OpportunityPayload {
    fn into_record(self, id: String) -> Option<KeywordOpportunity> {
        let keyword = self.keyword?;
        Some(KeywordOpportunity {
            id,
            keyword,
            search_volume: self.search_volume.and_then(to_count),
            cpc: self.cpc.filter(|value| value.is_finite()).map(|value| value.max(0.0)),
            keyword_difficulty: self.keyword_difficulty.and_then(to_percent),
            current_pre_staked: self.current_pre_staked.and_then(to_count),
            is_available: self.is_available,
            opportunity_score: self.opportunity_score.and_then(to_percent),
            top_staker: self.top_staker,
            category: self.category,
        })
    }
}

fn to_count(value: f64) -> Option<u64> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().max(0.0) as u64)
}

fn to_percent(value: f64) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 100.0) as u32)
}

fn deserialize_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned: String = text
                .trim()
                .chars()
                .filter(|c| !matches!(c, ',' | '$' | '%' | '_' | ' '))
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    })
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => Some(flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "available" => Some(true),
            "false" | "no" | "taken" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let text = match value {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => return Ok(None),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use anyhow::anyhow;

    use super::*;

    struct ScriptedModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(ScriptedModel {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(ScriptedModel {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl AnalysisModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            _api_key: &str,
            prompt: &str,
            _schema: &Value,
        ) -> anyhow::Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            self.reply.clone().map_err(|message| anyhow!(message))
        }
    }

    fn keyword_array(count: usize) -> String {
        let items: Vec<Value> = (0..count)
            .map(|idx| {
                serde_json::json!({
                    "keyword": format!("keyword {idx}"),
                    "searchVolume": 1000 + idx,
                    "cpc": 1.25,
                    "keywordDifficulty": 30,
                    "currentPreStaked": 500,
                    "isAvailable": idx % 2 == 0,
                    "opportunityScore": 70
                })
            })
            .collect();
        Value::Array(items).to_string()
    }

    #[test]
    fn strips_json_fences() {
        let raw = "```json\n[{\"keyword\":\"a\"}]\n```";
        assert_eq!(strip_code_fences(raw), "[{\"keyword\":\"a\"}]");
        assert_eq!(strip_code_fences("```[]```"), "[]");
        assert_eq!(strip_code_fences("  []  "), "[]");
    }

    #[test]
    fn sixteen_elements_get_unique_ids() {
        let raw = keyword_array(16);
        let records =
            parse_opportunities(&raw, AnalysisSource::AiGenerated, 1_700_000_000_000)
                .expect("parse");
        assert_eq!(records.len(), 16);
        let ids: HashSet<_> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids.len(), 16);
        assert!(records.iter().all(|record| !record.id.is_empty()));
        assert_eq!(records[3].id, "gen-3-1700000000000");
    }

    #[test]
    fn csv_ids_use_csv_tag() {
        let records =
            parse_opportunities(&keyword_array(2), AnalysisSource::CsvImport, 42).expect("parse");
        assert_eq!(records[1].id, "csv-1-42");
    }

    #[test]
    fn injected_id_overrides_model_id() {
        let raw = r#"[{"id": "model-id", "keyword": "wallet"}]"#;
        let records = parse_opportunities(raw, AnalysisSource::AiGenerated, 7).expect("parse");
        assert_eq!(records[0].id, "gen-0-7");
    }

    #[test]
    fn invalid_json_is_an_analysis_failure() {
        let err = parse_opportunities("```json\nnot json\n```", AnalysisSource::AiGenerated, 1)
            .expect_err("should fail");
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn non_array_is_an_analysis_failure() {
        let err = parse_opportunities(r#"{"keyword": "a"}"#, AnalysisSource::CsvImport, 1)
            .expect_err("should fail");
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn empty_reply_is_an_empty_batch() {
        let records = parse_opportunities("   ", AnalysisSource::AiGenerated, 1).expect("parse");
        assert!(records.is_empty());
    }

    #[test]
    fn malformed_entries_are_rejected_and_ranges_clamped() {
        let raw = r#"[
            {"keyword": "good", "searchVolume": "1,200", "cpc": -3, "keywordDifficulty": 140,
             "currentPreStaked": 99.6, "opportunityScore": -5, "isAvailable": "available"},
            {"searchVolume": 10},
            {"keyword": "   "},
            "just a string",
            null,
            {"keyword": "sparse", "cpc": "n/a", "topStaker": ""}
        ]"#;
        let records = parse_opportunities(raw, AnalysisSource::AiGenerated, 9).expect("parse");
        assert_eq!(records.len(), 2);
        let good = &records[0];
        assert_eq!(good.id, "gen-0-9");
        assert_eq!(good.search_volume, Some(1200));
        assert_eq!(good.cpc, Some(0.0));
        assert_eq!(good.keyword_difficulty, Some(100));
        assert_eq!(good.current_pre_staked, Some(100));
        assert_eq!(good.opportunity_score, Some(0));
        assert_eq!(good.is_available, Some(true));

        let sparse = &records[1];
        assert_eq!(sparse.id, "gen-5-9");
        assert_eq!(sparse.cpc, None);
        assert_eq!(sparse.search_volume, None);
        assert_eq!(sparse.top_staker, None);
        assert_eq!(sparse.availability_label(), "Taken");
    }

    #[tokio::test]
    async fn niche_analysis_returns_normalized_records() {
        let model = ScriptedModel::replying(&format!("```json\n{}\n```", keyword_array(3)));
        let analyzer = Analyzer::new(model.clone());
        let records = analyzer
            .generate_keyword_analysis("DeFi Protocols", "key")
            .await
            .expect("analysis");
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|record| record.id.starts_with("gen-")));
        assert_eq!(model.prompt_count(), 1);
    }

    #[tokio::test]
    async fn missing_key_skips_the_model() {
        let model = ScriptedModel::replying("[]");
        let analyzer = Analyzer::new(model.clone());
        let err = analyzer
            .analyze_csv_data("Keyword\nwallet", "  ")
            .await
            .expect_err("should fail");
        assert!(matches!(err, AnalysisError::MissingApiKey));
        assert_eq!(model.prompt_count(), 0);
    }

    #[tokio::test]
    async fn transport_failures_map_to_source_specific_messages() {
        let analyzer = Analyzer::new(ScriptedModel::failing("403 Forbidden"));
        let niche_err = analyzer
            .generate_keyword_analysis("Crypto Wallets", "bad-key")
            .await
            .expect_err("should fail");
        assert!(matches!(niche_err, AnalysisError::Transport(_)));
        assert_eq!(
            niche_err.user_message(AnalysisSource::AiGenerated),
            "Failed to generate keyword analysis. Please check your API key."
        );
        let csv_err = analyzer
            .analyze_csv_data("Keyword\nwallet", "bad-key")
            .await
            .expect_err("should fail");
        assert_eq!(
            csv_err.user_message(AnalysisSource::CsvImport),
            "Failed to analyze CSV data."
        );
    }

    #[tokio::test]
    async fn unreadable_upload_is_reported_as_csv_parse_failure() {
        let model = ScriptedModel::replying("[]");
        let analyzer = Analyzer::new(model.clone());
        let input = AnalysisInput::CsvFile(PathBuf::from("/nonexistent/prestake/export.csv"));
        let err = analyzer.analyze(&input, "key").await.expect_err("should fail");
        assert!(matches!(err, AnalysisError::Upload(_)));
        assert_eq!(err.user_message(AnalysisSource::CsvImport), "Failed to parse CSV");
        assert_eq!(model.prompt_count(), 0);
    }

    #[test]
    fn non_scalar_metrics_stay_undefined() {
        let raw = r#"[{"keyword": "wallet", "searchVolume": 1000, "cpc": {"usd": 2.5},
            "keywordDifficulty": [40], "opportunityScore": true}]"#;
        let records = parse_opportunities(raw, AnalysisSource::AiGenerated, 3).expect("parse");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].keyword, "wallet");
        assert_eq!(records[0].search_volume, Some(1000));
        assert_eq!(records[0].cpc, None);
        assert_eq!(records[0].keyword_difficulty, None);
        assert_eq!(records[0].opportunity_score, None);
    }

    #[tokio::test]
    async fn latin1_export_is_decoded_lossily() {
        let path = std::env::temp_dir().join(format!(
            "prestake-latin1-{}.csv",
            std::process::id()
        ));
        std::fs::write(&path, b"Keyword,Volume\ncaf\xe9 wallet,100\n").expect("write sample");
        let model = ScriptedModel::replying(r#"[{"keyword": "cafe wallet"}]"#);
        let analyzer = Analyzer::new(model.clone());
        let records = analyzer
            .analyze(&AnalysisInput::CsvFile(path.clone()), "key")
            .await
            .expect("analysis");
        let _ = std::fs::remove_file(&path);
        assert_eq!(records.len(), 1);
        assert!(records[0].id.starts_with("csv-0-"));
        let prompts = model.prompts.lock().expect("prompts");
        assert!(prompts[0].contains("caf\u{FFFD} wallet,100"));
    }

    #[tokio::test]
    async fn spawned_analysis_reports_on_the_bus() {
        let path = std::env::temp_dir().join(format!(
            "prestake-analysis-{}.csv",
            std::process::id()
        ));
        std::fs::write(&path, "Keyword,Volume\nwallet,100\n").expect("write sample");
        let analyzer = Arc::new(Analyzer::new(ScriptedModel::replying("oops")));
        let (tx, mut rx) = broadcast::channel(4);
        spawn_analysis(
            analyzer,
            7,
            AnalysisInput::CsvFile(path.clone()),
            "key".to_string(),
            tx,
        );
        match rx.recv().await.expect("outcome") {
            Command::AnalysisFinished(outcome) => {
                assert_eq!(outcome.seq, 7);
                assert_eq!(outcome.source, AnalysisSource::CsvImport);
                assert_eq!(outcome.result, Err("Failed to analyze CSV data.".to_string()));
            }
            other => panic!("unexpected command: {other:?}"),
        }
        let _ = std::fs::remove_file(path);
    }
}
