// Aggregation service - Use cases for building chart-ready consumption series
use crate::application::fetch_cache::{CacheStats, FetchCache};
use crate::application::telemetry_source::TelemetrySource;
use crate::domain::alignment::{align, expected_labels, AlignedSeries};
use crate::domain::bucket::{bucket_samples, roll_up_daily, Bucket, SlotAggregation};
use crate::domain::differential::{
    consumption_contributions, interval_delta, select_boundary, total_over_range, BOUNDARY_LIMIT,
    BOUNDARY_TOLERANCE_MS,
};
use crate::domain::error::{AggregationError, FetchError};
use crate::domain::fingerprint::QueryFingerprint;
use crate::domain::merge::{merge, MergedView};
use crate::domain::metric::{MetricCatalog, MetricDefinition};
use crate::domain::resolution::{resolve, Resolution};
use crate::domain::telemetry::{Aggregation, OrderBy, Sample, TelemetryPayload, TelemetryQuery};
use chrono::{FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 24 * HOUR_MS;

#[derive(Debug, Clone)]
pub struct AggregationSettings {
    /// Upper bound for one cross-entity aggregate call.
    pub timeout: Duration,
    /// Viewer's timezone; buckets follow its wall clock.
    pub utc_offset: FixedOffset,
    /// Maximum points requested per upstream query.
    pub max_points: u32,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            utc_offset: Utc.fix(),
            max_points: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRequest {
    pub entity_ids: Vec<String>,
    pub metric_type: String,
    pub dates: Vec<NaiveDate>,
    pub resolution_hint: Option<Resolution>,
    /// Fail the whole call when any entity fails instead of reporting it.
    pub strict: bool,
}

impl SeriesRequest {
    pub fn new(entity_ids: Vec<String>, metric_type: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        Self {
            entity_ids,
            metric_type: metric_type.into(),
            dates,
            resolution_hint: None,
            strict: false,
        }
    }

    pub fn with_resolution(mut self, resolution: Option<Resolution>) -> Self {
        self.resolution_hint = resolution;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Aligned series for every requested entity, in request order.
///
/// Entities whose fetch failed still appear (as all-gap series) and are
/// listed in `errors`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub metric: MetricDefinition,
    pub resolution: Resolution,
    pub labels: Vec<String>,
    pub series: Vec<AlignedSeries>,
    pub errors: BTreeMap<String, FetchError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedSeries {
    pub aggregated: AggregatedSeries,
    pub view: MergedView,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodConsumption {
    pub entity_id: String,
    pub start_boundary: Option<Sample>,
    pub end_boundary: Option<Sample>,
    /// Boundary difference; `None` when no end reading was found.
    pub consumption: Option<f64>,
    /// Difference between the first and last hourly reading in the range.
    pub range_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub charts: CacheStats,
    pub kpis: CacheStats,
}

#[derive(Clone)]
pub struct AggregationService {
    source: Arc<dyn TelemetrySource>,
    chart_cache: FetchCache,
    kpi_cache: FetchCache,
    metrics: MetricCatalog,
    settings: AggregationSettings,
}

impl AggregationService {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        chart_cache: FetchCache,
        kpi_cache: FetchCache,
        metrics: MetricCatalog,
        settings: AggregationSettings,
    ) -> Self {
        Self {
            source,
            chart_cache,
            kpi_cache,
            metrics,
            settings,
        }
    }

    /// Build aligned, gap-aware series for a selection of entities.
    pub async fn get_aggregated_series(&self, request: &SeriesRequest) -> Result<AggregatedSeries, AggregationError> {
        self.with_deadline(self.aggregate(request)).await
    }

    /// Aggregated series plus table rows, chart datasets and KPIs.
    pub async fn get_merged_view(&self, request: &SeriesRequest) -> Result<MergedSeries, AggregationError> {
        let aggregated = self.get_aggregated_series(request).await?;
        let view = merge(&aggregated.series);
        Ok(MergedSeries { aggregated, view })
    }

    /// Accumulator consumption between two instants, read from boundary samples.
    pub async fn get_period_consumption(
        &self,
        entity_id: &str,
        metric_type: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<PeriodConsumption, AggregationError> {
        self.with_deadline(self.period_consumption(entity_id, metric_type, start_ms, end_ms))
            .await
    }

    pub fn invalidate(&self, entity_id: &str) -> usize {
        self.chart_cache.invalidate(entity_id) + self.kpi_cache.invalidate(entity_id)
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            charts: self.chart_cache.stats(),
            kpis: self.kpi_cache.stats(),
        }
    }

    async fn with_deadline<T, F>(&self, operation: F) -> Result<T, AggregationError>
    where
        F: Future<Output = Result<T, AggregationError>>,
    {
        match tokio::time::timeout(self.settings.timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Aggregate query exceeded {:?}, aborting", self.settings.timeout);
                Err(AggregationError::Timeout(self.settings.timeout))
            }
        }
    }

    fn metric(&self, metric_type: &str) -> Result<&MetricDefinition, AggregationError> {
        self.metrics
            .get(metric_type)
            .ok_or_else(|| AggregationError::UnknownMetric(metric_type.to_string()))
    }

    async fn aggregate(&self, request: &SeriesRequest) -> Result<AggregatedSeries, AggregationError> {
        let metric = self.metric(&request.metric_type)?.clone();
        let (Some(first), Some(last)) = (request.dates.iter().min(), request.dates.iter().max()) else {
            return Err(AggregationError::InvalidRequest("no dates selected".to_string()));
        };

        let range_start = self.local_midnight_ms(*first)?;
        let range_end = self.local_midnight_ms(*last)? + DAY_MS;
        let query = self.series_query(&metric, range_start, range_end);
        let mode = SlotAggregation::for_kind(metric.kind);

        // Fan out; each entity settles on its own and order follows the request.
        let fetches = request.entity_ids.iter().map(|entity_id| {
            let query = query.clone();
            let metric = &metric;
            async move {
                let result = self
                    .fetch_cached(&self.chart_cache, entity_id, query)
                    .await
                    .and_then(|payload| {
                        self.hourly_buckets(entity_id, metric, &payload, range_start, range_end, mode)
                    });
                (entity_id.clone(), result)
            }
        });
        let settled = join_all(fetches).await;

        // `None` marks an entity whose fetch failed.
        let mut per_entity: Vec<(String, Option<Vec<Bucket>>)> = Vec::with_capacity(settled.len());
        let mut errors = BTreeMap::new();
        for (entity_id, result) in settled {
            match result {
                Ok(buckets) => per_entity.push((entity_id, Some(buckets))),
                Err(e) => {
                    tracing::warn!("Error fetching {} for {}: {}", metric.metric_type, entity_id, e);
                    errors.insert(entity_id.clone(), e);
                    per_entity.push((entity_id, None));
                }
            }
        }

        if request.strict && !errors.is_empty() {
            let summary = errors
                .iter()
                .map(|(entity, e)| format!("{}: {}", entity, e))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AggregationError::EntityFailures(summary));
        }

        let stored: Vec<Bucket> = per_entity
            .iter()
            .filter_map(|(_, buckets)| buckets.as_ref())
            .flat_map(|buckets| buckets.iter().cloned())
            .collect();
        let resolution = resolve(&request.dates, &stored, request.resolution_hint);
        let labels = expected_labels(&request.dates, resolution);

        let series: Vec<AlignedSeries> = per_entity
            .iter()
            .map(|(entity_id, hourly)| match (hourly, resolution) {
                (None, _) => AlignedSeries::empty(entity_id, &labels),
                (Some(hourly), Resolution::Hourly) => align(entity_id, hourly, &labels),
                (Some(hourly), Resolution::Daily) => align(entity_id, &roll_up_daily(hourly, mode), &labels),
            })
            .collect();

        tracing::debug!(
            "Aggregated {} for {} entities: {} labels ({}), {} failures",
            metric.metric_type,
            series.len(),
            labels.len(),
            resolution,
            errors.len()
        );

        Ok(AggregatedSeries {
            metric,
            resolution,
            labels,
            series,
            errors,
        })
    }

    /// Hourly buckets for one entity; daily views roll these up.
    fn hourly_buckets(
        &self,
        entity_id: &str,
        metric: &MetricDefinition,
        payload: &TelemetryPayload,
        range_start: i64,
        range_end: i64,
        mode: SlotAggregation,
    ) -> Result<Vec<Bucket>, FetchError> {
        let samples = payload.require(&metric.telemetry_key)?;

        let values: Vec<Sample> = if metric.is_accumulator() {
            consumption_contributions(samples)
        } else {
            samples.to_vec()
        };
        let in_range: Vec<Sample> = values
            .into_iter()
            .filter(|s| s.timestamp_ms >= range_start && s.timestamp_ms < range_end)
            .collect();

        Ok(bucket_samples(
            entity_id,
            &metric.metric_type,
            &in_range,
            Resolution::Hourly,
            mode,
            &self.settings.utc_offset,
        ))
    }

    async fn period_consumption(
        &self,
        entity_id: &str,
        metric_type: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<PeriodConsumption, AggregationError> {
        let metric = self.metric(metric_type)?;
        if !metric.is_accumulator() {
            return Err(AggregationError::InvalidRequest(format!(
                "{} is not an accumulator metric",
                metric_type
            )));
        }
        if end_ms <= start_ms {
            return Err(AggregationError::InvalidRequest("end must be after start".to_string()));
        }

        let key = metric.telemetry_key.as_str();
        let range_query = TelemetryQuery::new([key])
            .range(start_ms, end_ms)
            .interval(Resolution::Hourly.interval_ms())
            .aggregation(Aggregation::Max)
            .limit(self.settings.max_points)
            .order_by(OrderBy::Asc);

        let (start_payload, end_payload, range_payload) = tokio::try_join!(
            self.fetch_cached(&self.kpi_cache, entity_id, boundary_query(key, start_ms)),
            self.fetch_cached(&self.kpi_cache, entity_id, boundary_query(key, end_ms)),
            self.fetch_cached(&self.kpi_cache, entity_id, range_query),
        )?;

        let start_boundary = select_boundary(start_payload.require(key)?, start_ms, BOUNDARY_TOLERANCE_MS);
        let end_boundary = select_boundary(end_payload.require(key)?, end_ms, BOUNDARY_TOLERANCE_MS);

        Ok(PeriodConsumption {
            entity_id: entity_id.to_string(),
            consumption: interval_delta(start_boundary.as_ref(), end_boundary.as_ref()),
            start_boundary,
            end_boundary,
            range_total: total_over_range(range_payload.require(key)?),
        })
    }

    async fn fetch_cached(
        &self,
        cache: &FetchCache,
        entity_id: &str,
        query: TelemetryQuery,
    ) -> Result<Arc<TelemetryPayload>, FetchError> {
        let fingerprint = QueryFingerprint::new(entity_id, &query);
        let source = self.source.clone();
        let entity = entity_id.to_string();

        cache
            .get_or_fetch(fingerprint, entity_id, move || async move {
                source.fetch(&entity, &query).await
            })
            .await
    }

    fn series_query(&self, metric: &MetricDefinition, range_start: i64, range_end: i64) -> TelemetryQuery {
        let key = metric.telemetry_key.as_str();
        if metric.is_accumulator() {
            // One extra hour gives the first hour of the range a baseline reading.
            TelemetryQuery::new([key])
                .range(range_start - HOUR_MS, range_end)
                .interval(Resolution::Hourly.interval_ms())
                .aggregation(Aggregation::Max)
                .limit(self.settings.max_points)
                .order_by(OrderBy::Asc)
        } else {
            TelemetryQuery::new([key])
                .range(range_start, range_end)
                .interval(Resolution::Hourly.interval_ms())
                .aggregation(Aggregation::Avg)
                .limit(self.settings.max_points)
                .order_by(OrderBy::Asc)
        }
    }

    fn local_midnight_ms(&self, date: NaiveDate) -> Result<i64, AggregationError> {
        self.settings
            .utc_offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(|| AggregationError::InvalidRequest(format!("date {} has no local midnight", date)))
    }
}

fn boundary_query(key: &str, target_ms: i64) -> TelemetryQuery {
    TelemetryQuery::new([key])
        .range(
            target_ms.saturating_sub(BOUNDARY_TOLERANCE_MS),
            target_ms.saturating_add(BOUNDARY_TOLERANCE_MS),
        )
        .interval(2 * BOUNDARY_TOLERANCE_MS)
        .aggregation(Aggregation::Max)
        .limit(BOUNDARY_LIMIT)
        .order_by(OrderBy::Desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric::{MetricKind, YAxisPosition};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // 2024-01-01T00:00:00Z
    const JAN_1: i64 = 1_704_067_200_000;

    #[derive(Default)]
    struct MockSource {
        series: HashMap<String, Vec<Sample>>,
        failing: HashSet<String>,
        missing_key: HashSet<String>,
        delay: Duration,
        delays: HashMap<String, Duration>,
        calls: AtomicUsize,
    }

    impl MockSource {
        fn with(mut self, entity_id: &str, samples: Vec<Sample>) -> Self {
            self.series.insert(entity_id.to_string(), samples);
            self
        }

        fn delayed(mut self, entity_id: &str, delay: Duration) -> Self {
            self.delays.insert(entity_id.to_string(), delay);
            self
        }

        fn failing(mut self, entity_id: &str) -> Self {
            self.failing.insert(entity_id.to_string());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TelemetrySource for MockSource {
        async fn fetch(&self, entity_id: &str, query: &TelemetryQuery) -> Result<TelemetryPayload, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(entity_id).copied().unwrap_or(self.delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(entity_id) {
                return Err(FetchError::Transport(format!("{} unreachable", entity_id)));
            }
            if self.missing_key.contains(entity_id) {
                return Ok(TelemetryPayload::new());
            }

            let start = query.start_ts.unwrap_or(i64::MIN);
            let end = query.end_ts.unwrap_or(i64::MAX);
            let samples: Vec<Sample> = self
                .series
                .get(entity_id)
                .map(|all| {
                    all.iter()
                        .filter(|s| s.timestamp_ms >= start && s.timestamp_ms <= end)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();

            let mut payload = TelemetryPayload::new();
            for key in &query.keys {
                payload.insert(key.clone(), samples.clone());
            }
            Ok(payload)
        }
    }

    fn catalog() -> MetricCatalog {
        MetricCatalog::new(vec![
            MetricDefinition::new(
                "energy".into(),
                "activeEnergy".into(),
                MetricKind::Accumulator,
                "kWh".into(),
                YAxisPosition::Left,
                2,
            ),
            MetricDefinition::new(
                "temperature".into(),
                "temperature".into(),
                MetricKind::Instantaneous,
                "°C".into(),
                YAxisPosition::Right,
                1,
            ),
        ])
    }

    fn service(source: Arc<MockSource>, timeout: Duration) -> AggregationService {
        AggregationService::new(
            source,
            FetchCache::new("charts", Duration::from_secs(300)),
            FetchCache::new("kpis", Duration::from_secs(30)),
            catalog(),
            AggregationSettings {
                timeout,
                ..AggregationSettings::default()
            },
        )
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ids(entities: &[&str]) -> Vec<String> {
        entities.iter().map(|e| e.to_string()).collect()
    }

    fn at(hour: i64, minute: i64) -> i64 {
        JAN_1 + hour * HOUR_MS + minute * 60_000
    }

    #[tokio::test]
    async fn test_accumulator_hourly_consumption() {
        let source = Arc::new(MockSource::default().with(
            "meter-1",
            vec![
                Sample::new(at(-1, 0), 100.0),
                Sample::new(at(0, 30), 110.0),
                Sample::new(at(1, 30), 115.0),
                Sample::new(at(3, 30), 112.0),
            ],
        ));
        let service = service(source.clone(), Duration::from_secs(5));

        let request = SeriesRequest::new(ids(&["meter-1"]), "energy", vec![date("2024-01-01")]);
        let result = service.get_aggregated_series(&request).await.unwrap();

        assert_eq!(result.resolution, Resolution::Hourly);
        assert_eq!(result.labels.len(), 24);
        let values = &result.series[0].values;
        assert_eq!(values[0], Some(10.0));
        assert_eq!(values[1], Some(5.0));
        assert_eq!(values[2], None);
        // counter went backwards, clamped
        assert_eq!(values[3], Some(0.0));
        assert_eq!(result.series[0].coverage(), 3);
    }

    #[tokio::test]
    async fn test_daily_roll_up_for_long_selection() {
        let day = |d: i64, h: i64| JAN_1 + d * 24 * HOUR_MS + h * HOUR_MS;
        let source = Arc::new(MockSource::default().with(
            "meter-1",
            vec![
                Sample::new(day(0, 0), 0.0),
                Sample::new(day(0, 5), 4.0),
                Sample::new(day(0, 9), 6.0),
                Sample::new(day(2, 8), 9.0),
            ],
        ));
        let service = service(source, Duration::from_secs(5));
        let dates = vec![
            date("2024-01-01"),
            date("2024-01-02"),
            date("2024-01-03"),
            date("2024-01-04"),
        ];

        let result = service
            .get_aggregated_series(&SeriesRequest::new(ids(&["meter-1"]), "energy", dates))
            .await
            .unwrap();

        assert_eq!(result.resolution, Resolution::Daily);
        assert_eq!(result.labels, vec!["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"]);
        assert_eq!(result.series[0].values, vec![Some(6.0), None, Some(3.0), None]);
    }

    #[tokio::test]
    async fn test_stored_daily_shape_overrides_date_count() {
        let noon = |d: i64| JAN_1 + d * 24 * HOUR_MS + 12 * HOUR_MS;
        let source = Arc::new(
            MockSource::default().with("sensor-1", vec![Sample::new(noon(0), 18.5), Sample::new(noon(1), 19.5)]),
        );
        let service = service(source, Duration::from_secs(5));

        let request = SeriesRequest::new(
            ids(&["sensor-1"]),
            "temperature",
            vec![date("2024-01-01"), date("2024-01-02")],
        );
        let result = service.get_aggregated_series(&request).await.unwrap();

        assert_eq!(result.resolution, Resolution::Daily);
        assert_eq!(result.series[0].values, vec![Some(18.5), Some(19.5)]);
    }

    #[tokio::test]
    async fn test_stored_daily_shape_independent_of_entity_count() {
        let noon = |d: i64| JAN_1 + d * 24 * HOUR_MS + 12 * HOUR_MS;
        let readings = vec![Sample::new(noon(0), 18.5), Sample::new(noon(1), 19.5)];
        let source = Arc::new(
            MockSource::default()
                .with("sensor-1", readings.clone())
                .with("sensor-2", readings),
        );
        let service = service(source, Duration::from_secs(5));
        let dates = vec![date("2024-01-01"), date("2024-01-02")];

        let one = service
            .get_aggregated_series(&SeriesRequest::new(ids(&["sensor-1"]), "temperature", dates.clone()))
            .await
            .unwrap();
        let two = service
            .get_aggregated_series(&SeriesRequest::new(ids(&["sensor-1", "sensor-2"]), "temperature", dates))
            .await
            .unwrap();

        assert_eq!(one.resolution, Resolution::Daily);
        assert_eq!(two.resolution, Resolution::Daily);
        assert_eq!(two.series[1].values, vec![Some(18.5), Some(19.5)]);
    }

    #[tokio::test]
    async fn test_series_follow_request_order_not_completion_order() {
        let source = Arc::new(
            MockSource::default()
                .with("meter-1", vec![Sample::new(at(0, 0), 0.0), Sample::new(at(1, 0), 1.0)])
                .with("meter-2", vec![Sample::new(at(0, 0), 0.0), Sample::new(at(1, 0), 2.0)])
                .with("meter-3", vec![Sample::new(at(0, 0), 0.0), Sample::new(at(1, 0), 3.0)])
                .delayed("meter-1", Duration::from_millis(60))
                .delayed("meter-2", Duration::from_millis(30)),
        );
        let service = service(source, Duration::from_secs(5));
        let request = SeriesRequest::new(
            ids(&["meter-1", "meter-2", "meter-3"]),
            "energy",
            vec![date("2024-01-01")],
        );

        let result = service.get_aggregated_series(&request).await.unwrap();

        let order: Vec<&str> = result.series.iter().map(|s| s.entity_id.as_str()).collect();
        assert_eq!(order, vec!["meter-1", "meter-2", "meter-3"]);
        assert_eq!(result.series[0].values[1], Some(1.0));
        assert_eq!(result.series[1].values[1], Some(2.0));
        assert_eq!(result.series[2].values[1], Some(3.0));
    }

    #[tokio::test]
    async fn test_failed_entity_does_not_abort_siblings() {
        let source = Arc::new(
            MockSource::default()
                .with("meter-1", vec![Sample::new(at(0, 0), 1.0), Sample::new(at(2, 0), 3.0)])
                .failing("meter-2"),
        );
        let service = service(source, Duration::from_secs(5));

        let request = SeriesRequest::new(ids(&["meter-1", "meter-2"]), "energy", vec![date("2024-01-01")]);
        let result = service.get_aggregated_series(&request).await.unwrap();

        assert_eq!(result.series.len(), 2);
        assert_eq!(result.series[0].entity_id, "meter-1");
        assert_eq!(result.series[0].values[2], Some(2.0));
        assert_eq!(result.series[1].entity_id, "meter-2");
        assert_eq!(result.series[1], AlignedSeries::empty("meter-2", &result.labels));
        assert!(matches!(result.errors.get("meter-2"), Some(FetchError::Transport(_))));
        assert!(!result.errors.contains_key("meter-1"));

        let strict = service.get_aggregated_series(&request.clone().strict(true)).await;
        assert!(matches!(strict, Err(AggregationError::EntityFailures(_))));
    }

    #[tokio::test]
    async fn test_missing_metric_key_is_data_shape_error() {
        let mut source = MockSource::default();
        source.missing_key.insert("meter-1".to_string());
        let service = service(Arc::new(source), Duration::from_secs(5));

        let request = SeriesRequest::new(ids(&["meter-1"]), "energy", vec![date("2024-01-01")]);
        let result = service.get_aggregated_series(&request).await.unwrap();

        assert!(matches!(result.errors.get("meter-1"), Some(FetchError::DataShape(_))));
    }

    #[tokio::test]
    async fn test_repeated_queries_served_from_cache() {
        let source = Arc::new(MockSource::default().with("meter-1", vec![Sample::new(at(0, 0), 1.0)]));
        let service = service(source.clone(), Duration::from_secs(5));
        let request = SeriesRequest::new(ids(&["meter-1"]), "energy", vec![date("2024-01-01")]);

        let (a, b) = tokio::join!(
            service.get_aggregated_series(&request),
            service.get_aggregated_series(&request)
        );
        assert_eq!(a.unwrap(), b.unwrap());
        service.get_aggregated_series(&request).await.unwrap();
        assert_eq!(source.calls(), 1);

        assert_eq!(service.invalidate("meter-1"), 1);
        service.get_aggregated_series(&request).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(service.cache_stats().charts.valid_entries, 1);
    }

    #[tokio::test]
    async fn test_timeout_releases_cache_slot() {
        let source = Arc::new(MockSource {
            delay: Duration::from_secs(30),
            ..MockSource::default()
        });
        let service = service(source, Duration::from_millis(20));
        let request = SeriesRequest::new(ids(&["meter-1"]), "energy", vec![date("2024-01-01")]);

        let result = service.get_aggregated_series(&request).await;

        assert_eq!(result, Err(AggregationError::Timeout(Duration::from_millis(20))));
        assert_eq!(service.cache_stats().charts.in_flight, 0);
    }

    #[tokio::test]
    async fn test_request_validation() {
        let service = service(Arc::new(MockSource::default()), Duration::from_secs(5));

        let unknown = SeriesRequest::new(ids(&["meter-1"]), "steam", vec![date("2024-01-01")]);
        assert_eq!(
            service.get_aggregated_series(&unknown).await,
            Err(AggregationError::UnknownMetric("steam".to_string()))
        );

        let no_dates = SeriesRequest::new(ids(&["meter-1"]), "energy", vec![]);
        assert!(matches!(
            service.get_aggregated_series(&no_dates).await,
            Err(AggregationError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_merged_view_ranks_entities() {
        let source = Arc::new(
            MockSource::default()
                .with("meter-1", vec![Sample::new(at(0, 0), 0.0), Sample::new(at(1, 0), 2.0)])
                .with("meter-2", vec![Sample::new(at(0, 0), 0.0), Sample::new(at(1, 0), 7.0)]),
        );
        let service = service(source, Duration::from_secs(5));
        let request = SeriesRequest::new(ids(&["meter-1", "meter-2"]), "energy", vec![date("2024-01-01")]);

        let merged = service.get_merged_view(&request).await.unwrap();

        assert_eq!(merged.view.ranking[0].entity_id, "meter-2");
        assert_eq!(merged.view.ranking[0].rank, 1);
        assert_eq!(merged.view.summary.grand_total, 9.0);
        assert_eq!(merged.view.datasets.len(), 2);
    }

    #[tokio::test]
    async fn test_period_consumption_from_boundaries() {
        let source = Arc::new(MockSource::default().with(
            "meter-1",
            vec![
                Sample::new(at(0, 0) + 30_000, 100.0),
                Sample::new(at(3, 0), 130.0),
                Sample::new(at(6, 0) - 45_000, 145.0),
            ],
        ));
        let service = service(source, Duration::from_secs(5));

        let period = service
            .get_period_consumption("meter-1", "energy", at(0, 0), at(6, 0))
            .await
            .unwrap();

        assert_eq!(period.start_boundary.map(|s| s.value), Some(100.0));
        assert_eq!(period.end_boundary.map(|s| s.value), Some(145.0));
        assert_eq!(period.consumption, Some(45.0));
        assert_eq!(period.range_total, 45.0);
    }

    #[tokio::test]
    async fn test_period_consumption_without_boundaries() {
        let source = Arc::new(MockSource::default().with("meter-1", vec![Sample::new(at(6, 0), 50.0)]));
        let service = service(source, Duration::from_secs(5));

        let period = service
            .get_period_consumption("meter-1", "energy", at(0, 0), at(6, 0))
            .await
            .unwrap();
        assert_eq!(period.start_boundary, None);
        assert_eq!(period.consumption, Some(0.0));

        let none = service
            .get_period_consumption("meter-1", "energy", at(0, 0), at(3, 0))
            .await
            .unwrap();
        assert_eq!(none.consumption, None);

        assert!(matches!(
            service.get_period_consumption("meter-1", "temperature", at(0, 0), at(3, 0)).await,
            Err(AggregationError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_period_consumption_with_extreme_bounds() {
        let source = Arc::new(MockSource::default().with("meter-1", vec![Sample::new(0, 50.0)]));
        let service = service(source, Duration::from_secs(5));

        let from_min = service
            .get_period_consumption("meter-1", "energy", i64::MIN + 1, 0)
            .await
            .unwrap();
        assert_eq!(from_min.start_boundary, None);
        assert_eq!(from_min.end_boundary.map(|s| s.value), Some(50.0));
        assert_eq!(from_min.consumption, Some(0.0));

        let to_max = service
            .get_period_consumption("meter-1", "energy", 0, i64::MAX)
            .await
            .unwrap();
        assert_eq!(to_max.end_boundary, None);
        assert_eq!(to_max.consumption, None);
    }
}
