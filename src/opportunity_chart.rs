use crate::command::KeywordOpportunity;

pub const SIZE_BUCKETS: usize = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct ChartPoint {
    /// Difficulty
    pub x: f64,
    /// Volume
    pub y: f64,
    /// CPC, drives point size
    pub z: f64,
    pub name: String,
    pub score: Option<u32>,
}

impl ChartPoint {
    /// Tooltip text for the highlighted point, e.g. `wallet · score 82`.
    pub fn label(&self) -> String {
        match self.score {
            Some(score) => format!("{} · score {score}", self.name),
            None => format!("{} · score -", self.name),
        }
    }
}

/// Records without difficulty or volume have no position and yield `None`.
pub fn chart_point(record: &KeywordOpportunity) -> Option<ChartPoint> {
    Some(ChartPoint {
        x: f64::from(record.keyword_difficulty?),
        y: record.search_volume? as f64,
        z: record.cpc.unwrap_or(0.0),
        name: record.keyword.clone(),
        score: record.opportunity_score,
    })
}

pub fn chart_points(data: &[KeywordOpportunity]) -> Vec<ChartPoint> {
    data.iter().filter_map(chart_point).collect()
}

/// Split points into small/medium/large groups across the batch's CPC range.
pub fn size_buckets(points: &[ChartPoint]) -> [Vec<(f64, f64)>; SIZE_BUCKETS] {
    let mut buckets: [Vec<(f64, f64)>; SIZE_BUCKETS] = Default::default();
    if points.is_empty() {
        return buckets;
    }
    let min_z = points.iter().map(|p| p.z).fold(f64::INFINITY, f64::min);
    let max_z = points.iter().map(|p| p.z).fold(f64::NEG_INFINITY, f64::max);
    let span = max_z - min_z;
    for point in points {
        let idx = if span <= f64::EPSILON {
            0
        } else {
            let ratio = (point.z - min_z) / span;
            ((ratio * SIZE_BUCKETS as f64) as usize).min(SIZE_BUCKETS - 1)
        };
        buckets[idx].push((point.x, point.y));
    }
    buckets
}

/// Y-axis upper bound with some headroom; never zero.
pub fn volume_ceiling(points: &[ChartPoint]) -> f64 {
    let max_y = points.iter().map(|p| p.y).fold(0.0, f64::max);
    if max_y <= 0.0 { 1.0 } else { max_y * 1.1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(keyword: &str, difficulty: Option<u32>, volume: Option<u64>, cpc: Option<f64>) -> KeywordOpportunity {
        let mut record = KeywordOpportunity::new(keyword, keyword);
        record.keyword_difficulty = difficulty;
        record.search_volume = volume;
        record.cpc = cpc;
        record.opportunity_score = Some(60);
        record
    }

    #[test]
    fn projects_difficulty_volume_and_cpc() {
        let points = chart_points(&[record("wallet", Some(35), Some(12_000), Some(2.4))]);
        assert_eq!(
            points,
            vec![ChartPoint {
                x: 35.0,
                y: 12_000.0,
                z: 2.4,
                name: "wallet".to_string(),
                score: Some(60),
            }]
        );
    }

    #[test]
    fn records_without_position_are_skipped() {
        let points = chart_points(&[
            record("a", None, Some(10), Some(1.0)),
            record("b", Some(10), None, Some(1.0)),
            record("c", Some(10), Some(10), None),
        ]);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "c");
        assert_eq!(points[0].z, 0.0);
    }

    #[test]
    fn highlighted_point_carries_name_and_score() {
        let point = chart_point(&record("ledger wallet", Some(20), Some(900), Some(1.2)));
        assert_eq!(
            point.map(|p| p.label()).as_deref(),
            Some("ledger wallet · score 60")
        );
        let mut unscored = record("trezor", Some(20), Some(900), None);
        unscored.opportunity_score = None;
        assert_eq!(
            chart_point(&unscored).map(|p| p.label()).as_deref(),
            Some("trezor · score -")
        );
        assert!(chart_point(&record("ghost", None, Some(900), None)).is_none());
    }

    #[test]
    fn buckets_spread_across_cpc_range() {
        let points = chart_points(&[
            record("cheap", Some(10), Some(100), Some(0.5)),
            record("mid", Some(20), Some(200), Some(5.0)),
            record("pricey", Some(30), Some(300), Some(9.5)),
        ]);
        let buckets = size_buckets(&points);
        assert_eq!(buckets[0], vec![(10.0, 100.0)]);
        assert_eq!(buckets[1], vec![(20.0, 200.0)]);
        assert_eq!(buckets[2], vec![(30.0, 300.0)]);
    }

    #[test]
    fn flat_cpc_lands_in_one_bucket() {
        let points = chart_points(&[
            record("a", Some(10), Some(100), Some(1.0)),
            record("b", Some(20), Some(200), Some(1.0)),
        ]);
        let buckets = size_buckets(&points);
        assert_eq!(buckets[0].len(), 2);
        assert!(buckets[1].is_empty() && buckets[2].is_empty());
        assert_eq!(volume_ceiling(&[]), 1.0);
    }
}
