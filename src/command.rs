#[derive(Debug, Clone)]
pub enum Command {
    PriceUpdate(f64),
    AnalysisFinished(AnalysisOutcome),
    Error(String),
    Exit,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub seq: u64,
    pub source: AnalysisSource,
    pub result: Result<Vec<KeywordOpportunity>, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    AiGenerated,
    CsvImport,
}

impl AnalysisSource {
    pub fn id_tag(&self) -> &'static str {
        match self {
            AnalysisSource::AiGenerated => "gen",
            AnalysisSource::CsvImport => "csv",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisSource::AiGenerated => "AI Generator",
            AnalysisSource::CsvImport => "CSV Import",
        }
    }

    pub fn toggled(&self) -> AnalysisSource {
        match self {
            AnalysisSource::AiGenerated => AnalysisSource::CsvImport,
            AnalysisSource::CsvImport => AnalysisSource::AiGenerated,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordOpportunity {
    pub id: String,
    pub keyword: String,
    pub search_volume: Option<u64>,
    pub cpc: Option<f64>,
    pub keyword_difficulty: Option<u32>,
    pub current_pre_staked: Option<u64>,
    pub is_available: Option<bool>,
    pub opportunity_score: Option<u32>,
    pub top_staker: Option<String>,
    pub category: Option<String>,
}

impl KeywordOpportunity {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, keyword: impl Into<String>) -> Self {
        KeywordOpportunity {
            id: id.into(),
            keyword: keyword.into(),
            search_volume: None,
            cpc: None,
            keyword_difficulty: None,
            current_pre_staked: None,
            is_available: None,
            opportunity_score: None,
            top_staker: None,
            category: None,
        }
    }

    pub fn available(&self) -> bool {
        self.is_available.unwrap_or(false)
    }

    pub fn availability_label(&self) -> &'static str {
        if self.available() { "Available" } else { "Taken" }
    }
}
