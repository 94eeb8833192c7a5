use std::path::{Path, PathBuf};

use tracing::debug;

use crate::analysis::AnalysisInput;
use crate::command::{AnalysisOutcome, AnalysisSource, KeywordOpportunity};

#[derive(Clone, Debug, PartialEq)]
pub struct PendingRequest {
    pub seq: u64,
    pub input: AnalysisInput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultsView {
    Results,
    EmptyPlaceholder,
    Loading,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopOpportunity {
    pub keyword: String,
    pub score: u32,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub niche: String,
    pub api_key: String,
    pub is_loading: bool,
    pub error: Option<String>,
    pub data: Vec<KeywordOpportunity>,
    pub settings_open: bool,
    pub mode: AnalysisSource,
    pub pre_price: f64,
    pub csv_path: String,
    request_seq: u64,
}

impl AppState {
    pub fn new(niche: impl Into<String>, api_key: impl Into<String>, pre_price: f64) -> Self {
        let api_key = api_key.into();
        AppState {
            niche: niche.into(),
            settings_open: api_key.trim().is_empty(),
            api_key,
            is_loading: false,
            error: None,
            data: Vec::new(),
            mode: AnalysisSource::AiGenerated,
            pre_price,
            csv_path: String::new(),
            request_seq: 0,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    #[cfg(test)]
    pub fn latest_seq(&self) -> u64 {
        self.request_seq
    }

    fn begin_request(&mut self, input: AnalysisInput) -> Option<PendingRequest> {
        if !self.has_api_key() {
            self.settings_open = true;
            return None;
        }
        self.request_seq += 1;
        self.is_loading = true;
        self.error = None;
        Some(PendingRequest {
            seq: self.request_seq,
            input,
        })
    }

    pub fn submit_niche(&mut self) -> Option<PendingRequest> {
        let niche = self.niche.clone();
        self.begin_request(AnalysisInput::Niche(niche))
    }

    /// Queue a keyword export for analysis. Only `.csv` files are accepted.
    pub fn submit_csv(&mut self, path: PathBuf) -> Option<PendingRequest> {
        if !is_csv_path(&path) {
            self.fail_upload("Please choose a .csv file");
            return None;
        }
        if !self.has_api_key() {
            self.settings_open = true;
            return None;
        }
        self.mode = AnalysisSource::CsvImport;
        self.csv_path = path.display().to_string();
        self.begin_request(AnalysisInput::CsvFile(path))
    }

    /// Surface a failure that happened before a request could be issued.
    pub fn fail_upload(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Store the credential; returns the initial analysis when none has run yet.
    pub fn save_api_key(&mut self, key: &str) -> Option<PendingRequest> {
        self.api_key = key.trim().to_string();
        self.settings_open = false;
        if self.has_api_key() && self.data.is_empty() && !self.is_loading {
            self.submit_niche()
        } else {
            None
        }
    }

    /// Apply an analysis outcome unless a newer request has been issued since.
    pub fn apply_result(&mut self, outcome: AnalysisOutcome) -> bool {
        if outcome.seq != self.request_seq {
            debug!(
                seq = outcome.seq,
                latest = self.request_seq,
                "discarding stale analysis result"
            );
            return false;
        }
        self.is_loading = false;
        match outcome.result {
            Ok(records) => {
                self.data = records;
            }
            Err(message) => {
                self.error = Some(message);
            }
        }
        true
    }

    pub fn update_price(&mut self, price: f64) {
        if price.is_finite() && price > 0.0 {
            self.pre_price = price;
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn open_settings(&mut self) {
        self.settings_open = true;
    }

    pub fn close_settings(&mut self) {
        self.settings_open = false;
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    /// Highest score wins; on ties the later record is kept.
    pub fn top_opportunity(&self) -> Option<TopOpportunity> {
        let best = self.data.iter().reduce(|prev, current| {
            if score_of(prev) > score_of(current) {
                prev
            } else {
                current
            }
        })?;
        Some(TopOpportunity {
            keyword: best.keyword.clone(),
            score: best.opportunity_score.unwrap_or(0),
        })
    }

    pub fn total_volume(&self) -> Option<u64> {
        if self.data.is_empty() {
            return None;
        }
        Some(
            self.data
                .iter()
                .filter_map(|record| record.search_volume)
                .fold(0u64, u64::saturating_add),
        )
    }

    pub fn results_view(&self) -> ResultsView {
        if !self.data.is_empty() {
            ResultsView::Results
        } else if self.is_loading {
            ResultsView::Loading
        } else {
            ResultsView::EmptyPlaceholder
        }
    }
}

fn score_of(record: &KeywordOpportunity) -> i64 {
    record.opportunity_score.map(i64::from).unwrap_or(-1)
}

pub fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}
