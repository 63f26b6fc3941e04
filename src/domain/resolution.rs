// Hourly vs daily resolution policy
use crate::domain::bucket::Bucket;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Selections spanning up to this many calendar dates are shown hourly.
pub const HOURLY_DATE_THRESHOLD: usize = 3;

/// Hour at which daily-resolution records are stamped when stored alongside
/// hourly ones.
pub const DAILY_SENTINEL_HOUR: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Hourly,
    Daily,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Hourly => "hourly",
            Resolution::Daily => "daily",
        }
    }

    /// Upstream aggregation interval matching this resolution.
    pub fn interval_ms(&self) -> i64 {
        match self {
            Resolution::Hourly => 3_600_000,
            Resolution::Daily => 86_400_000,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hourly" | "hour" => Ok(Resolution::Hourly),
            "daily" | "day" => Ok(Resolution::Daily),
            other => Err(format!("unknown resolution '{}'", other)),
        }
    }
}

/// Resolution for a date selection: hourly for up to three distinct dates.
pub fn select_resolution(dates: &[NaiveDate]) -> Resolution {
    let distinct: BTreeSet<&NaiveDate> = dates.iter().collect();
    if distinct.len() <= HOURLY_DATE_THRESHOLD {
        Resolution::Hourly
    } else {
        Resolution::Daily
    }
}

/// Classify already-stored buckets by their shape.
///
/// Data is daily when every entity holds exactly one bucket per date, stamped
/// at the sentinel hour; this catches daily records sitting in an hourly store.
pub fn detect_stored_resolution(buckets: &[Bucket]) -> Option<Resolution> {
    if buckets.is_empty() {
        return None;
    }

    let mut per_slot: BTreeMap<(&str, NaiveDate), Vec<&Bucket>> = BTreeMap::new();
    for bucket in buckets {
        per_slot
            .entry((bucket.entity_id.as_str(), bucket.date))
            .or_default()
            .push(bucket);
    }

    let all_single_sentinel = per_slot
        .values()
        .all(|records| records.len() == 1 && is_sentinel_record(records[0]));

    if all_single_sentinel {
        Some(Resolution::Daily)
    } else {
        Some(Resolution::Hourly)
    }
}

/// Combine caller hint, stored-data shape and selection size.
pub fn resolve(dates: &[NaiveDate], stored: &[Bucket], hint: Option<Resolution>) -> Resolution {
    if let Some(hint) = hint {
        return hint;
    }
    match detect_stored_resolution(stored) {
        Some(Resolution::Daily) => Resolution::Daily,
        _ => select_resolution(dates),
    }
}

pub(crate) fn is_sentinel_record(bucket: &Bucket) -> bool {
    bucket.hour == Some(DAILY_SENTINEL_HOUR)
}
