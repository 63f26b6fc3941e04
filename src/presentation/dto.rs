// Mapper to convert domain results to JSON response types
use crate::application::aggregation_service::{AggregatedSeries, CacheStatsReport, MergedSeries, PeriodConsumption};
use crate::application::fetch_cache::CacheStats;
use crate::domain::merge::{ChartDataset, RankedEntity, SummaryKpis, TableRow, Trend};
use crate::domain::metric::{MetricDefinition, YAxisPosition};
use crate::domain::telemetry::Sample;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesResponse {
    pub metric_type: String,
    pub unit: String,
    pub y_axis: &'static str,
    pub decimal_places: u32,
    pub resolution: &'static str,
    pub labels: Vec<String>,
    pub series: Vec<SeriesDto>,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDto {
    pub entity_id: String,
    /// `null` marks a gap, never a zero reading.
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedResponse {
    #[serde(flatten)]
    pub series: SeriesResponse,
    pub rows: Vec<RowDto>,
    pub datasets: Vec<DatasetDto>,
    pub ranking: Vec<RankDto>,
    pub summary: SummaryDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowDto {
    pub entity_id: String,
    pub label: String,
    pub value: f64,
    pub variance_pct: f64,
    /// `null` when there is no previous period to compare against.
    pub trend_pct: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetDto {
    pub entity_id: String,
    pub color: &'static str,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankDto {
    pub rank: usize,
    pub entity_id: String,
    pub total: f64,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDto {
    pub grand_total: f64,
    pub entity_count: usize,
    pub top_entity: Option<String>,
    pub average_per_entity: f64,
    pub coverage_ratio: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionResponse {
    pub entity_id: String,
    pub consumption: Option<f64>,
    pub range_total: f64,
    pub start_boundary: Option<BoundaryDto>,
    pub end_boundary: Option<BoundaryDto>,
}

#[derive(Debug, Serialize)]
pub struct BoundaryDto {
    pub ts: i64,
    pub value: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsDto {
    pub size: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub charts: CacheStatsDto,
    pub kpis: CacheStatsDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub entity_id: String,
    pub removed: usize,
}

pub fn series_to_dto(aggregated: AggregatedSeries) -> SeriesResponse {
    let metric = aggregated.metric;
    let series = aggregated
        .series
        .into_iter()
        .map(|s| SeriesDto {
            entity_id: s.entity_id,
            values: round_values(&metric, s.values),
        })
        .collect();

    SeriesResponse {
        y_axis: match metric.y_axis_position {
            YAxisPosition::Left => "left",
            YAxisPosition::Right => "right",
        },
        decimal_places: metric.decimal_places,
        resolution: aggregated.resolution.as_str(),
        labels: aggregated.labels,
        series,
        errors: aggregated
            .errors
            .into_iter()
            .map(|(entity, e)| (entity, e.to_string()))
            .collect(),
        unit: metric.unit,
        metric_type: metric.metric_type,
    }
}

pub fn merged_to_dto(merged: MergedSeries) -> MergedResponse {
    let metric = merged.aggregated.metric.clone();
    let view = merged.view;

    MergedResponse {
        series: series_to_dto(merged.aggregated),
        rows: view.rows.into_iter().map(|r| row_to_dto(&metric, r)).collect(),
        datasets: view
            .datasets
            .into_iter()
            .map(|d| dataset_to_dto(&metric, d))
            .collect(),
        ranking: view.ranking.into_iter().map(|r| rank_to_dto(&metric, r)).collect(),
        summary: summary_to_dto(&metric, view.summary),
    }
}

pub fn consumption_to_dto(period: PeriodConsumption) -> ConsumptionResponse {
    ConsumptionResponse {
        entity_id: period.entity_id,
        consumption: period.consumption,
        range_total: period.range_total,
        start_boundary: period.start_boundary.map(boundary_to_dto),
        end_boundary: period.end_boundary.map(boundary_to_dto),
    }
}

pub fn cache_stats_to_dto(report: CacheStatsReport) -> CacheStatsResponse {
    CacheStatsResponse {
        charts: stats_to_dto(report.charts),
        kpis: stats_to_dto(report.kpis),
    }
}

fn round_values(metric: &MetricDefinition, values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.map(|v| metric.round(v))).collect()
}

fn row_to_dto(metric: &MetricDefinition, row: TableRow) -> RowDto {
    RowDto {
        entity_id: row.entity_id,
        label: row.label,
        value: metric.round(row.value),
        variance_pct: (row.variance_pct * 10.0).round() / 10.0,
        trend_pct: match row.trend {
            Trend::Change(pct) => Some((pct * 10.0).round() / 10.0),
            Trend::NoPreviousPeriod => None,
        },
    }
}

fn dataset_to_dto(metric: &MetricDefinition, dataset: ChartDataset) -> DatasetDto {
    DatasetDto {
        entity_id: dataset.entity_id,
        color: dataset.color,
        values: round_values(metric, dataset.values),
    }
}

fn rank_to_dto(metric: &MetricDefinition, ranked: RankedEntity) -> RankDto {
    RankDto {
        rank: ranked.rank,
        entity_id: ranked.entity_id,
        total: metric.round(ranked.total),
        color: ranked.color,
    }
}

fn summary_to_dto(metric: &MetricDefinition, summary: SummaryKpis) -> SummaryDto {
    SummaryDto {
        grand_total: metric.round(summary.grand_total),
        entity_count: summary.entity_count,
        top_entity: summary.top_entity,
        average_per_entity: metric.round(summary.average_per_entity),
        coverage_ratio: summary.coverage_ratio,
    }
}

fn boundary_to_dto(sample: Sample) -> BoundaryDto {
    BoundaryDto {
        ts: sample.timestamp_ms,
        value: sample.value,
    }
}

fn stats_to_dto(stats: CacheStats) -> CacheStatsDto {
    CacheStatsDto {
        size: stats.size,
        valid_entries: stats.valid_entries,
        expired_entries: stats.expired_entries,
        in_flight: stats.in_flight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alignment::AlignedSeries;
    use crate::domain::error::FetchError;
    use crate::domain::metric::MetricKind;
    use crate::domain::resolution::Resolution;

    #[test]
    fn test_series_json_keeps_gaps_as_null() {
        let mut errors = BTreeMap::new();
        errors.insert("meter-2".to_string(), FetchError::Transport("down".into()));
        let aggregated = AggregatedSeries {
            metric: MetricDefinition::new(
                "energy".into(),
                "activeEnergy".into(),
                MetricKind::Accumulator,
                "kWh".into(),
                YAxisPosition::Left,
                1,
            ),
            resolution: Resolution::Daily,
            labels: vec!["2024-01-01".into(), "2024-01-02".into()],
            series: vec![AlignedSeries {
                entity_id: "meter-1".into(),
                labels: vec!["2024-01-01".into(), "2024-01-02".into()],
                values: vec![Some(1.26), None],
            }],
            errors,
        };

        let json = serde_json::to_value(series_to_dto(aggregated)).unwrap();

        assert_eq!(json["resolution"], "daily");
        assert_eq!(json["yAxis"], "left");
        assert_eq!(json["series"][0]["values"], serde_json::json!([1.3, null]));
        assert_eq!(json["errors"]["meter-2"], "transport error: down");
    }
}
