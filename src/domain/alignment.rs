// Label alignment and gap filling for chart-ready series
use crate::domain::bucket::Bucket;
use crate::domain::resolution::Resolution;
use chrono::{NaiveDate, TimeZone, Timelike};
use std::collections::{BTreeSet, HashMap};

/// A series laid onto the complete label set of a selection.
///
/// `values[i] == None` is a gap: the slot had no data. It is never the same
/// thing as a reading of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    pub entity_id: String,
    pub labels: Vec<String>,
    pub values: Vec<Option<f64>>,
}

impl AlignedSeries {
    /// A series of gaps only, used when an entity could not be fetched.
    pub fn empty(entity_id: &str, labels: &[String]) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            labels: labels.to_vec(),
            values: vec![None; labels.len()],
        }
    }

    pub fn present_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().filter_map(|v| *v)
    }

    /// Number of slots carrying data.
    pub fn coverage(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn total(&self) -> f64 {
        self.present_values().sum()
    }

    pub fn average(&self) -> Option<f64> {
        let count = self.coverage();
        if count == 0 {
            None
        } else {
            Some(self.total() / count as f64)
        }
    }
}

pub fn day_label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn hour_label(date: NaiveDate, hour: u32) -> String {
    format!("{} {:02}:00", day_label(date), hour)
}

/// Local calendar date and hour a timestamp falls into.
///
/// Any offset within the hour (`:00`, `:30`, `:59`) maps to the same slot.
pub fn local_slot<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> Option<(NaiveDate, u32)> {
    let local = tz.timestamp_millis_opt(timestamp_ms).earliest()?;
    Some((local.date_naive(), local.hour()))
}

/// Every label a chart over `dates` must show, sorted.
///
/// Daily resolution gives one label per distinct date, hourly gives 24.
pub fn expected_labels(dates: &[NaiveDate], resolution: Resolution) -> Vec<String> {
    let distinct: BTreeSet<NaiveDate> = dates.iter().copied().collect();

    match resolution {
        Resolution::Daily => distinct.into_iter().map(day_label).collect(),
        Resolution::Hourly => distinct
            .into_iter()
            .flat_map(|date| (0..24).map(move |hour| hour_label(date, hour)))
            .collect(),
    }
}

/// Lay an entity's buckets onto the expected labels by exact label match.
///
/// Labels without a bucket, and buckets flagged as carrying no data, become
/// gaps. Buckets belonging to other entities or outside the label set are
/// ignored.
pub fn align(entity_id: &str, buckets: &[Bucket], labels: &[String]) -> AlignedSeries {
    let by_label: HashMap<&str, &Bucket> = buckets
        .iter()
        .filter(|b| b.entity_id == entity_id)
        .map(|b| (b.label.as_str(), b))
        .collect();

    let values = labels
        .iter()
        .map(|label| {
            by_label
                .get(label.as_str())
                .filter(|b| b.has_data)
                .map(|b| b.value)
        })
        .collect();

    AlignedSeries {
        entity_id: entity_id.to_string(),
        labels: labels.to_vec(),
        values,
    }
}
