// Time bucketing of raw samples
use crate::domain::alignment::{day_label, hour_label, local_slot};
use crate::domain::metric::MetricKind;
use crate::domain::resolution::{is_sentinel_record, Resolution};
use crate::domain::telemetry::Sample;
use chrono::{NaiveDate, TimeZone};
use std::collections::BTreeMap;

/// Aggregated value for one (entity, metric, time slot).
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: String,
    pub entity_id: String,
    pub metric_type: String,
    pub date: NaiveDate,
    /// Local hour for hourly buckets, `None` for daily ones.
    pub hour: Option<u32>,
    pub value: f64,
    pub has_data: bool,
}

impl Bucket {
    pub fn hourly(
        entity_id: &str,
        metric_type: &str,
        date: NaiveDate,
        hour: u32,
        value: f64,
        has_data: bool,
    ) -> Self {
        Self {
            label: hour_label(date, hour),
            entity_id: entity_id.to_string(),
            metric_type: metric_type.to_string(),
            date,
            hour: Some(hour),
            value,
            has_data,
        }
    }

    pub fn daily(entity_id: &str, metric_type: &str, date: NaiveDate, value: f64, has_data: bool) -> Self {
        Self {
            label: day_label(date),
            entity_id: entity_id.to_string(),
            metric_type: metric_type.to_string(),
            date,
            hour: None,
            value,
            has_data,
        }
    }
}

/// How samples falling into the same slot are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotAggregation {
    /// Samples are consumption contributions; the slot total is their sum.
    Sum,
    /// Samples are gauge readings; the slot value is their mean.
    Mean,
}

impl SlotAggregation {
    pub fn for_kind(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Accumulator => SlotAggregation::Sum,
            MetricKind::Instantaneous => SlotAggregation::Mean,
        }
    }
}

#[derive(Debug, Default)]
struct SlotAccumulator {
    sum: f64,
    with_data: usize,
}

impl SlotAccumulator {
    fn push(&mut self, value: f64, has_data: bool) {
        if has_data {
            self.sum += value;
            self.with_data += 1;
        }
    }

    fn has_data(&self) -> bool {
        self.with_data > 0
    }

    fn value(&self, mode: SlotAggregation) -> f64 {
        match mode {
            SlotAggregation::Sum => self.sum,
            SlotAggregation::Mean if self.with_data > 0 => self.sum / self.with_data as f64,
            SlotAggregation::Mean => 0.0,
        }
    }
}

/// Group samples into local-time hour or day buckets.
///
/// Only slots with at least one contributing sample produce a bucket; a slot
/// whose samples all lack data yields a bucket flagged `has_data = false`.
/// Output is sorted by label.
pub fn bucket_samples<Tz: TimeZone>(
    entity_id: &str,
    metric_type: &str,
    samples: &[Sample],
    resolution: Resolution,
    mode: SlotAggregation,
    tz: &Tz,
) -> Vec<Bucket> {
    let mut slots: BTreeMap<(NaiveDate, Option<u32>), SlotAccumulator> = BTreeMap::new();

    for sample in samples {
        let Some((date, hour)) = local_slot(sample.timestamp_ms, tz) else {
            tracing::warn!(
                "Dropping sample with unrepresentable timestamp {} for {}",
                sample.timestamp_ms,
                entity_id
            );
            continue;
        };
        let key = match resolution {
            Resolution::Hourly => (date, Some(hour)),
            Resolution::Daily => (date, None),
        };
        slots.entry(key).or_default().push(sample.value, sample.has_data);
    }

    slots
        .into_iter()
        .map(|((date, hour), acc)| match hour {
            Some(hour) => Bucket::hourly(entity_id, metric_type, date, hour, acc.value(mode), acc.has_data()),
            None => Bucket::daily(entity_id, metric_type, date, acc.value(mode), acc.has_data()),
        })
        .collect()
}

/// Roll hourly buckets up into daily ones.
///
/// A date holding a single record at the sentinel hour is already a whole-day
/// value and is carried over unchanged rather than re-aggregated.
pub fn roll_up_daily(buckets: &[Bucket], mode: SlotAggregation) -> Vec<Bucket> {
    let mut groups: BTreeMap<(&str, &str, NaiveDate), Vec<&Bucket>> = BTreeMap::new();
    for bucket in buckets {
        groups
            .entry((bucket.entity_id.as_str(), bucket.metric_type.as_str(), bucket.date))
            .or_default()
            .push(bucket);
    }

    let mut daily: Vec<Bucket> = groups
        .into_iter()
        .map(|((entity_id, metric_type, date), records)| {
            if let [single] = records.as_slice() {
                if is_sentinel_record(single) || single.hour.is_none() {
                    return Bucket::daily(entity_id, metric_type, date, single.value, single.has_data);
                }
            }

            let mut acc = SlotAccumulator::default();
            for record in &records {
                acc.push(record.value, record.has_data);
            }
            Bucket::daily(entity_id, metric_type, date, acc.value(mode), acc.has_data())
        })
        .collect();

    daily.sort_by(|a, b| a.label.cmp(&b.label).then_with(|| a.entity_id.cmp(&b.entity_id)));
    daily
}
