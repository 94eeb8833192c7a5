use std::cmp::Ordering;

use ratatui::style::Color;

use crate::command::KeywordOpportunity;

pub const STAKE_URL: &str = "https://keywords.presearch.com/stake";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
    Keyword,
    SearchVolume,
    Cpc,
    KeywordDifficulty,
    CurrentPreStaked,
    OpportunityScore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortConfig {
    pub key: SortKey,
    pub direction: SortDirection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug)]
pub struct TableColumn {
    pub label: &'static str,
    pub sort_key: Option<SortKey>,
    pub align: ColumnAlign,
    pub width: u16,
    pub hint: &'static str,
}

pub const COLUMNS: [TableColumn; 9] = [
    TableColumn {
        label: "Keyword",
        sort_key: Some(SortKey::Keyword),
        align: ColumnAlign::Left,
        width: 30,
        hint: "The specific search term users enter. High intent keywords drive better traffic.",
    },
    TableColumn {
        label: "Score",
        sort_key: Some(SortKey::OpportunityScore),
        align: ColumnAlign::Center,
        width: 7,
        hint: "Score (0-100) combining Volume, CPC, and low Competition. Higher is better.",
    },
    TableColumn {
        label: "Volume",
        sort_key: Some(SortKey::SearchVolume),
        align: ColumnAlign::Right,
        width: 10,
        hint: "Estimated monthly searches. Higher volume means more potential traffic.",
    },
    TableColumn {
        label: "CPC",
        sort_key: Some(SortKey::Cpc),
        align: ColumnAlign::Right,
        width: 8,
        hint: "Cost Per Click ($). Indicates commercial intent. Advertisers pay this much for ads.",
    },
    TableColumn {
        label: "CPC (PRE)",
        sort_key: Some(SortKey::Cpc),
        align: ColumnAlign::Right,
        width: 11,
        hint: "Cost Per Click converted to PRE tokens based on current market price.",
    },
    TableColumn {
        label: "Difficulty",
        sort_key: Some(SortKey::KeywordDifficulty),
        align: ColumnAlign::Right,
        width: 10,
        hint: "SEO Difficulty (0-100). Higher numbers mean it's harder to rank organically.",
    },
    TableColumn {
        label: "Staked PRE",
        sort_key: Some(SortKey::CurrentPreStaked),
        align: ColumnAlign::Center,
        width: 14,
        hint: "Total PRE tokens currently staked on this keyword. You must beat the top staker to rank #1.",
    },
    TableColumn {
        label: "Stake Value ($)",
        sort_key: Some(SortKey::CurrentPreStaked),
        align: ColumnAlign::Right,
        width: 15,
        hint: "The current USD value of the total PRE staked on this keyword.",
    },
    TableColumn {
        label: "Action",
        sort_key: None,
        align: ColumnAlign::Right,
        width: 7,
        hint: "Direct link to the Presearch staking dashboard for this keyword.",
    },
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DerivedRow {
    pub cpc_in_pre: Option<f64>,
    pub stake_value_usd: Option<f64>,
}

impl DerivedRow {
    pub fn compute(record: &KeywordOpportunity, pre_price: f64) -> DerivedRow {
        let cpc_in_pre = record
            .cpc
            .map(|cpc| if pre_price > 0.0 { cpc / pre_price } else { 0.0 });
        let stake_value_usd = record
            .current_pre_staked
            .map(|staked| staked as f64 * pre_price);
        DerivedRow {
            cpc_in_pre,
            stake_value_usd,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl SortValue<'_> {
    fn compare(&self, other: &SortValue<'_>) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            _ => Ordering::Equal,
        }
    }
}

fn sort_value(record: &KeywordOpportunity, key: SortKey) -> Option<SortValue<'_>> {
    match key {
        SortKey::Keyword => Some(SortValue::Text(record.keyword.as_str())),
        SortKey::SearchVolume => record.search_volume.map(|v| SortValue::Number(v as f64)),
        SortKey::Cpc => record.cpc.map(SortValue::Number),
        SortKey::KeywordDifficulty => record
            .keyword_difficulty
            .map(|v| SortValue::Number(f64::from(v))),
        SortKey::CurrentPreStaked => record
            .current_pre_staked
            .map(|v| SortValue::Number(v as f64)),
        SortKey::OpportunityScore => record
            .opportunity_score
            .map(|v| SortValue::Number(f64::from(v))),
    }
}

/// Order two records on `config`; undefined values sort last in either direction.
pub fn compare_records(
    a: &KeywordOpportunity,
    b: &KeywordOpportunity,
    config: SortConfig,
) -> Ordering {
    match (sort_value(a, config.key), sort_value(b, config.key)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = a.compare(&b);
            match config.direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct OpportunityTable {
    sort: Option<SortConfig>,
}

impl OpportunityTable {
    pub fn sort_config(&self) -> Option<SortConfig> {
        self.sort
    }

    /// First click on a column sorts ascending; clicking the ascending column again flips it.
    pub fn handle_sort(&mut self, key: SortKey) {
        let direction = match self.sort {
            Some(config) if config.key == key && config.direction == SortDirection::Ascending => {
                SortDirection::Descending
            }
            _ => SortDirection::Ascending,
        };
        self.sort = Some(SortConfig { key, direction });
    }

    pub fn sorted<'a>(&self, data: &'a [KeywordOpportunity]) -> Vec<&'a KeywordOpportunity> {
        let mut rows: Vec<&KeywordOpportunity> = data.iter().collect();
        if let Some(config) = self.sort {
            rows.sort_by(|a, b| compare_records(a, b, config));
        }
        rows
    }

    pub fn sort_indicator(&self, column: &TableColumn) -> &'static str {
        match (self.sort, column.sort_key) {
            (Some(config), Some(key)) if config.key == key => match config.direction {
                SortDirection::Ascending => "▲",
                SortDirection::Descending => "▼",
            },
            (_, Some(_)) => "↕",
            (_, None) => "",
        }
    }
}

pub fn difficulty_context(difficulty: u32) -> &'static str {
    if difficulty > 70 {
        "Hard to rank. Requires significant staking."
    } else if difficulty > 40 {
        "Moderate competition. Achievable with consistent staking."
    } else {
        "Low competition. Great opportunity for easy ranking."
    }
}

pub fn difficulty_color(difficulty: u32) -> Color {
    if difficulty > 70 {
        Color::Red
    } else if difficulty > 40 {
        Color::Yellow
    } else {
        Color::Green
    }
}

pub fn score_context(score: u32) -> &'static str {
    if score > 80 {
        "Excellent Opportunity! High volume, low competition."
    } else if score > 50 {
        "Good potential, but verify competition levels."
    } else {
        "Low opportunity. Likely high effort for low return."
    }
}

pub fn availability_context(record: &KeywordOpportunity) -> String {
    if record.available() {
        "Status: Available. This keyword has low competition.".to_string()
    } else {
        "Status: Taken. Already heavily staked by others.".to_string()
    }
}

pub fn stake_context(record: &KeywordOpportunity) -> String {
    let staked = record
        .current_pre_staked
        .map(format_grouped)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "Top staker: {}. Beat {} PRE to win.",
        record.top_staker.as_deref().unwrap_or("None"),
        staked
    )
}

pub fn stake_link(keyword: &str) -> String {
    format!("{STAKE_URL}?keyword={}", encode_component(keyword))
}

/// URI component escaping: unreserved marks stay literal, every other byte of
/// the UTF-8 form becomes `%XX`.
fn encode_component(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(char::from(byte)),
            _ => {
                out.push('%');
                out.push(char::from(HEX[usize::from(byte >> 4)]));
                out.push(char::from(HEX[usize::from(byte & 0x0f)]));
            }
        }
    }
    out
}

pub fn format_grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Grouped number with a fixed count of decimals, e.g. `1,234.50`.
pub fn format_grouped_decimal(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let formatted = format!("{:.*}", decimals, value.abs());
    let (whole, fraction) = match formatted.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (formatted.as_str(), None),
    };
    let grouped = whole
        .parse::<u64>()
        .map(format_grouped)
        .unwrap_or_else(|_| whole.to_string());
    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

pub fn format_cpc(cpc: Option<f64>) -> String {
    cpc.map(|value| format!("${value:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_cpc_in_pre(derived: &DerivedRow) -> String {
    derived
        .cpc_in_pre
        .map(|value| format!("{} PRE", format_grouped_decimal(value, 0)))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_stake_value(derived: &DerivedRow) -> String {
    derived
        .stake_value_usd
        .map(|value| format!("${}", format_grouped_decimal(value, 2)))
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_optional_count(value: Option<u64>) -> String {
    value.map(format_grouped).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, score: Option<u32>, cpc: Option<f64>) -> KeywordOpportunity {
        let mut record = KeywordOpportunity::new(id, format!("kw {id}"));
        record.opportunity_score = score;
        record.cpc = cpc;
        record.current_pre_staked = Some(1_000);
        record
    }

    fn ids(rows: &[&KeywordOpportunity]) -> Vec<String> {
        rows.iter().map(|row| row.id.clone()).collect()
    }

    #[test]
    fn zero_price_yields_zero_cpc_in_pre() {
        let derived = DerivedRow::compute(&record("a", None, Some(2.5)), 0.0);
        assert_eq!(derived.cpc_in_pre, Some(0.0));
        assert_eq!(derived.stake_value_usd, Some(0.0));
    }

    #[test]
    fn positive_price_divides_and_multiplies_exactly() {
        let price = 0.015;
        let derived = DerivedRow::compute(&record("a", None, Some(2.5)), price);
        assert_eq!(derived.cpc_in_pre, Some(2.5 / price));
        assert_eq!(derived.stake_value_usd, Some(1_000.0 * price));
    }

    #[test]
    fn undefined_inputs_give_undefined_derivations() {
        let mut row = record("a", None, None);
        row.current_pre_staked = None;
        let derived = DerivedRow::compute(&row, 0.02);
        assert_eq!(derived.cpc_in_pre, None);
        assert_eq!(derived.stake_value_usd, None);
    }

    #[test]
    fn ascending_then_descending_reverses_with_undefined_last() {
        let data = vec![
            record("a", Some(50), None),
            record("b", None, None),
            record("c", Some(90), None),
            record("d", Some(10), None),
            record("e", None, None),
        ];
        let mut table = OpportunityTable::default();
        table.handle_sort(SortKey::OpportunityScore);
        assert_eq!(ids(&table.sorted(&data)), ["d", "a", "c", "b", "e"]);
        table.handle_sort(SortKey::OpportunityScore);
        assert_eq!(
            table.sort_config().map(|config| config.direction),
            Some(SortDirection::Descending)
        );
        assert_eq!(ids(&table.sorted(&data)), ["c", "a", "d", "b", "e"]);
    }

    #[test]
    fn third_click_returns_to_ascending() {
        let mut table = OpportunityTable::default();
        for _ in 0..3 {
            table.handle_sort(SortKey::Cpc);
        }
        assert_eq!(
            table.sort_config(),
            Some(SortConfig {
                key: SortKey::Cpc,
                direction: SortDirection::Ascending
            })
        );
    }

    #[test]
    fn switching_columns_always_starts_ascending() {
        let mut table = OpportunityTable::default();
        table.handle_sort(SortKey::Cpc);
        table.handle_sort(SortKey::Cpc);
        table.handle_sort(SortKey::SearchVolume);
        assert_eq!(
            table.sort_config().map(|config| config.direction),
            Some(SortDirection::Ascending)
        );
    }

    #[test]
    fn every_sortable_column_reads_a_value() {
        let mut full = record("full", Some(70), Some(1.5));
        full.search_volume = Some(500);
        full.keyword_difficulty = Some(30);
        for key in COLUMNS.iter().filter_map(|column| column.sort_key) {
            assert!(sort_value(&full, key).is_some(), "{key:?}");
        }
    }

    #[test]
    fn unsorted_table_keeps_insertion_order() {
        let data = vec![record("b", Some(1), None), record("a", Some(2), None)];
        let table = OpportunityTable::default();
        assert_eq!(ids(&table.sorted(&data)), ["b", "a"]);
    }

    #[test]
    fn equal_values_keep_their_relative_order() {
        let data = vec![
            record("x", Some(5), None),
            record("y", Some(5), None),
            record("z", Some(1), None),
        ];
        let mut table = OpportunityTable::default();
        table.handle_sort(SortKey::OpportunityScore);
        assert_eq!(ids(&table.sorted(&data)), ["z", "x", "y"]);
    }

    #[test]
    fn text_columns_use_native_ordering() {
        let mut data = vec![record("1", None, None), record("2", None, None), record("3", None, None)];
        data[0].keyword = "banana".to_string();
        data[1].keyword = "Apple".to_string();
        data[2].keyword = "apple".to_string();
        let mut table = OpportunityTable::default();
        table.handle_sort(SortKey::Keyword);
        let keywords: Vec<_> = table.sorted(&data).iter().map(|r| r.keyword.clone()).collect();
        assert_eq!(keywords, ["Apple", "apple", "banana"]);
    }

    #[test]
    fn sort_indicator_tracks_active_column() {
        let mut table = OpportunityTable::default();
        assert_eq!(table.sort_indicator(&COLUMNS[3]), "↕");
        table.handle_sort(SortKey::Cpc);
        assert_eq!(table.sort_indicator(&COLUMNS[3]), "▲");
        assert_eq!(table.sort_indicator(&COLUMNS[4]), "▲");
        table.handle_sort(SortKey::Cpc);
        assert_eq!(table.sort_indicator(&COLUMNS[4]), "▼");
        assert_eq!(table.sort_indicator(&COLUMNS[8]), "");
    }

    #[test]
    fn context_thresholds() {
        assert!(difficulty_context(71).starts_with("Hard"));
        assert!(difficulty_context(70).starts_with("Moderate"));
        assert!(difficulty_context(40).starts_with("Low"));
        assert!(score_context(81).starts_with("Excellent"));
        assert!(score_context(80).starts_with("Good"));
        assert!(score_context(50).starts_with("Low"));
    }

    #[test]
    fn stake_link_escapes_keyword() {
        assert_eq!(
            stake_link("best crypto wallet & app"),
            "https://keywords.presearch.com/stake?keyword=best%20crypto%20wallet%20%26%20app"
        );
        assert_eq!(
            stake_link("c++ (beginner's) guide!"),
            "https://keywords.presearch.com/stake?keyword=c%2B%2B%20(beginner's)%20guide!"
        );
        assert_eq!(
            stake_link("café/wallet?"),
            "https://keywords.presearch.com/stake?keyword=caf%C3%A9%2Fwallet%3F"
        );
    }

    #[test]
    fn grouping_helpers() {
        assert_eq!(format_grouped(0), "0");
        assert_eq!(format_grouped(999), "999");
        assert_eq!(format_grouped(1_000), "1,000");
        assert_eq!(format_grouped(12_345_678), "12,345,678");
        assert_eq!(format_grouped_decimal(1234.5, 2), "1,234.50");
        assert_eq!(format_grouped_decimal(166.666, 0), "167");
        assert_eq!(format_cpc(Some(2.5)), "$2.50");
        assert_eq!(format_cpc(None), "-");
    }
}
