// Cross-entity merging: tables, chart datasets and summary KPIs
use crate::domain::alignment::AlignedSeries;

/// Chart colors, assigned by an entity's position in the selection.
///
/// Reordering the selection reorders the colors.
pub const PALETTE: [&str; 10] = [
    "#2563eb", "#16a34a", "#f59e0b", "#dc2626", "#7c3aed", "#0891b2", "#db2777", "#65a30d",
    "#ea580c", "#475569",
];

pub fn color_for(selection_index: usize) -> &'static str {
    PALETTE[selection_index % PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trend {
    /// Percentage change against the entity's previous period.
    Change(f64),
    NoPreviousPeriod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub entity_id: String,
    pub label: String,
    pub value: f64,
    pub variance_pct: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartDataset {
    pub entity_id: String,
    pub color: &'static str,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntity {
    pub rank: usize,
    pub entity_id: String,
    pub total: f64,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryKpis {
    pub grand_total: f64,
    pub entity_count: usize,
    pub top_entity: Option<String>,
    pub average_per_entity: f64,
    /// Share of slots across all entities that carry data, 0.0..=1.0.
    pub coverage_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedView {
    pub labels: Vec<String>,
    pub rows: Vec<TableRow>,
    pub datasets: Vec<ChartDataset>,
    pub ranking: Vec<RankedEntity>,
    pub summary: SummaryKpis,
}

/// Deviation of `value` from `average` in percent. Zero when the average is zero.
pub fn variance_pct(value: f64, average: f64) -> f64 {
    if average == 0.0 {
        0.0
    } else {
        (value - average) / average * 100.0
    }
}

pub fn trend(previous: Option<f64>, current: f64) -> Trend {
    match previous {
        Some(prev) if prev != 0.0 => Trend::Change((current - prev) / prev * 100.0),
        _ => Trend::NoPreviousPeriod,
    }
}

/// Entities ordered by total, largest first. Ties keep selection order.
pub fn rank_entities(series: &[AlignedSeries]) -> Vec<RankedEntity> {
    let mut totals: Vec<(usize, &AlignedSeries, f64)> = series
        .iter()
        .enumerate()
        .map(|(index, s)| (index, s, s.total()))
        .collect();
    totals.sort_by(|a, b| b.2.total_cmp(&a.2));

    totals
        .into_iter()
        .enumerate()
        .map(|(position, (index, s, total))| RankedEntity {
            rank: position + 1,
            entity_id: s.entity_id.clone(),
            total,
            color: color_for(index),
        })
        .collect()
}

/// One row per (entity, period with data), grouped by entity in selection
/// order and chronological within an entity.
pub fn build_rows(series: &[AlignedSeries]) -> Vec<TableRow> {
    let mut rows = Vec::new();

    for s in series {
        let average = s.average().unwrap_or(0.0);

        let mut periods: Vec<(&String, f64)> = s
            .labels
            .iter()
            .zip(&s.values)
            .filter_map(|(label, value)| value.map(|v| (label, v)))
            .collect();
        periods.sort_by(|a, b| a.0.cmp(b.0));

        let mut previous: Option<f64> = None;
        for (label, value) in periods {
            rows.push(TableRow {
                entity_id: s.entity_id.clone(),
                label: label.clone(),
                value,
                variance_pct: variance_pct(value, average),
                trend: trend(previous, value),
            });
            previous = Some(value);
        }
    }

    rows
}

pub fn build_datasets(series: &[AlignedSeries]) -> Vec<ChartDataset> {
    series
        .iter()
        .enumerate()
        .map(|(index, s)| ChartDataset {
            entity_id: s.entity_id.clone(),
            color: color_for(index),
            values: s.values.clone(),
        })
        .collect()
}

pub fn summarize(series: &[AlignedSeries], ranking: &[RankedEntity]) -> SummaryKpis {
    let grand_total: f64 = ranking.iter().map(|r| r.total).sum();
    let entity_count = series.len();
    let slots: usize = series.iter().map(|s| s.values.len()).sum();
    let covered: usize = series.iter().map(AlignedSeries::coverage).sum();

    SummaryKpis {
        grand_total,
        entity_count,
        top_entity: ranking
            .first()
            .filter(|r| r.total > 0.0)
            .map(|r| r.entity_id.clone()),
        average_per_entity: if entity_count == 0 {
            0.0
        } else {
            grand_total / entity_count as f64
        },
        coverage_ratio: if slots == 0 {
            0.0
        } else {
            covered as f64 / slots as f64
        },
    }
}

/// Merge aligned series (in selection order) into every cross-entity artifact.
///
/// Ranking is derived from the same totals in the same pass, so it can never
/// disagree with the values shown.
pub fn merge(series: &[AlignedSeries]) -> MergedView {
    let ranking = rank_entities(series);
    let summary = summarize(series, &ranking);

    MergedView {
        labels: series.first().map(|s| s.labels.clone()).unwrap_or_default(),
        rows: build_rows(series),
        datasets: build_datasets(series),
        ranking,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(entity_id: &str, values: Vec<Option<f64>>) -> AlignedSeries {
        let labels = (1..=values.len()).map(|d| format!("2024-01-{:02}", d)).collect();
        AlignedSeries {
            entity_id: entity_id.to_string(),
            labels,
            values,
        }
    }

    #[test]
    fn test_variance() {
        // average of [10, 20, 30] is 20
        assert_eq!(variance_pct(30.0, 20.0), 50.0);
        assert_eq!(variance_pct(10.0, 20.0), -50.0);
        assert_eq!(variance_pct(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_rows_variance_uses_entity_average() {
        let rows = build_rows(&[series("m1", vec![Some(10.0), None, Some(20.0), Some(30.0)])]);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].value, 30.0);
        assert_eq!(rows[2].variance_pct, 50.0);
    }

    #[test]
    fn test_trend_looks_back_within_entity() {
        let rows = build_rows(&[
            series("m1", vec![Some(10.0), Some(15.0)]),
            series("m2", vec![Some(0.0), Some(8.0)]),
        ]);

        assert_eq!(rows[0].trend, Trend::NoPreviousPeriod);
        assert_eq!(rows[1].trend, Trend::Change(50.0));
        // m2's first row does not look back into m1
        assert_eq!(rows[2].trend, Trend::NoPreviousPeriod);
        // previous value of zero
        assert_eq!(rows[3].trend, Trend::NoPreviousPeriod);
    }

    #[test]
    fn test_trend_skips_gaps() {
        let rows = build_rows(&[series("m1", vec![Some(10.0), None, Some(5.0)])]);
        assert_eq!(rows[1].trend, Trend::Change(-50.0));
    }

    #[test]
    fn test_ranking_is_stable() {
        let ranking = rank_entities(&[
            series("a", vec![Some(5.0)]),
            series("b", vec![Some(9.0)]),
            series("c", vec![Some(5.0)]),
        ]);

        let order: Vec<(&str, usize)> = ranking.iter().map(|r| (r.entity_id.as_str(), r.rank)).collect();
        assert_eq!(order, vec![("b", 1), ("a", 2), ("c", 3)]);
        assert_eq!(ranking[0].color, color_for(1));
    }

    #[test]
    fn test_colors_follow_selection_order() {
        let first = build_datasets(&[series("a", vec![]), series("b", vec![])]);
        let swapped = build_datasets(&[series("b", vec![]), series("a", vec![])]);

        assert_eq!(first[0].color, swapped[0].color);
        assert_eq!(first[0].entity_id, "a");
        assert_eq!(swapped[0].entity_id, "b");
        assert_eq!(color_for(PALETTE.len()), PALETTE[0]);
    }

    #[test]
    fn test_merge_summary() {
        let view = merge(&[
            series("a", vec![Some(1.0), None]),
            series("b", vec![Some(3.0), Some(4.0)]),
        ]);

        assert_eq!(view.labels.len(), 2);
        assert_eq!(view.summary.grand_total, 8.0);
        assert_eq!(view.summary.entity_count, 2);
        assert_eq!(view.summary.top_entity.as_deref(), Some("b"));
        assert_eq!(view.summary.average_per_entity, 4.0);
        assert_eq!(view.summary.coverage_ratio, 0.75);
        assert_eq!(view.datasets[0].values, vec![Some(1.0), None]);
    }

    #[test]
    fn test_merge_empty() {
        let view = merge(&[]);
        assert!(view.labels.is_empty());
        assert_eq!(view.summary.top_entity, None);
        assert_eq!(view.summary.coverage_ratio, 0.0);
    }
}
