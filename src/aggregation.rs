//! Time-bucketed application counts
//!
//! Matching records are counted per UTC day, then re-keyed to the start of
//! each coarser period (ISO week starting Monday, month, quarter, year) and
//! summed. Every resolution is derived from the same day counts, so the
//! total is identical at all five resolutions.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::EmailRecord;

/// Counts keyed by bucket start, ascending
pub type Counts = BTreeMap<DateTime<Utc>, u64>;

/// Bucket granularity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Calendar day
    Day,
    /// ISO week, Monday to Sunday
    Week,
    /// Calendar month
    Month,
    /// Calendar quarter
    Quarter,
    /// Calendar year
    Year,
}

impl Resolution {
    /// All resolutions, finest first
    pub const ALL: [Resolution; 5] = [
        Resolution::Day,
        Resolution::Week,
        Resolution::Month,
        Resolution::Quarter,
        Resolution::Year,
    ];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
            Resolution::Quarter => "quarter",
            Resolution::Year => "year",
        }
    }

    /// First day of the period containing `day`
    pub fn period_start(&self, day: NaiveDate) -> NaiveDate {
        match self {
            Resolution::Day => day,
            Resolution::Week => {
                day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
            }
            Resolution::Month => day.with_day(1).unwrap_or(day),
            Resolution::Quarter => {
                let month = (day.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(day.year(), month, 1).unwrap_or(day)
            }
            Resolution::Year => NaiveDate::from_ymd_opt(day.year(), 1, 1).unwrap_or(day),
        }
    }

    /// Chart label of the period starting at `start`
    pub fn label(&self, start: DateTime<Utc>) -> String {
        match self {
            Resolution::Day => start.format("%d/%b").to_string(),
            Resolution::Week => format!(
                "Week {} {}",
                start.iso_week().week(),
                start.format("%b %Y")
            ),
            Resolution::Month => start.format("%b %Y").to_string(),
            Resolution::Quarter => format!("Q{} {}", start.month0() / 3 + 1, start.year()),
            Resolution::Year => start.year().to_string(),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Resolution::Day),
            "week" => Ok(Resolution::Week),
            "month" => Ok(Resolution::Month),
            "quarter" => Ok(Resolution::Quarter),
            "year" => Ok(Resolution::Year),
            _ => Err(Error::UnknownResolution(s.to_string())),
        }
    }
}

/// How the plotted resolution is chosen
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Use this resolution as is
    Explicit(Resolution),
    /// Finest resolution with at most `max_points` buckets
    Auto {
        /// Point budget
        max_points: usize,
    },
}

/// Counts at all five resolutions
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketedCounts {
    /// Per day
    pub day: Counts,
    /// Per ISO week
    pub week: Counts,
    /// Per month
    pub month: Counts,
    /// Per quarter
    pub quarter: Counts,
    /// Per year
    pub year: Counts,
}

impl BucketedCounts {
    /// Counts at `resolution`
    pub fn get(&self, resolution: Resolution) -> &Counts {
        match resolution {
            Resolution::Day => &self.day,
            Resolution::Week => &self.week,
            Resolution::Month => &self.month,
            Resolution::Quarter => &self.quarter,
            Resolution::Year => &self.year,
        }
    }

    fn get_mut(&mut self, resolution: Resolution) -> &mut Counts {
        match resolution {
            Resolution::Day => &mut self.day,
            Resolution::Week => &mut self.week,
            Resolution::Month => &mut self.month,
            Resolution::Quarter => &mut self.quarter,
            Resolution::Year => &mut self.year,
        }
    }

    /// Sum of all counts (the same at every resolution)
    pub fn total(&self) -> u64 {
        self.day.values().sum()
    }
}

/// Chart input: labels and values ordered by ascending period
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartData {
    /// Formatted period labels
    pub labels: Vec<String>,
    /// Count per period
    pub values: Vec<u64>,
    /// Resolution the periods are at
    pub resolution: Resolution,
}

/// Predicate matching records whose snippet contains `marker`, ignoring case
pub fn snippet_contains(marker: &str) -> impl Fn(&EmailRecord) -> bool + use<> {
    let marker = marker.to_lowercase();
    move |record: &EmailRecord| record.snippet.to_lowercase().contains(&marker)
}

/// Count records accepted by `predicate` per UTC day
///
/// Records whose timestamp is out of range are skipped.
pub fn count_by_day<P>(records: &[EmailRecord], predicate: P) -> Counts
where
    P: Fn(&EmailRecord) -> bool,
{
    let mut counts = Counts::new();
    for record in records {
        if !predicate(record) {
            continue;
        }
        let Some(timestamp) = DateTime::from_timestamp_millis(record.internal_date) else {
            tracing::debug!(
                id = %record.id,
                internal_date = record.internal_date,
                "Skipping record with invalid timestamp"
            );
            continue;
        };
        *counts.entry(day_start(timestamp.date_naive())).or_insert(0) += 1;
    }
    counts
}

/// Derive all coarser resolutions from day counts
pub fn aggregate(day_counts: &Counts) -> BucketedCounts {
    let mut buckets = BucketedCounts {
        day: day_counts.clone(),
        ..BucketedCounts::default()
    };

    for (start, count) in day_counts {
        let day = start.date_naive();
        for resolution in &Resolution::ALL[1..] {
            let key = day_start(resolution.period_start(day));
            *buckets.get_mut(*resolution).entry(key).or_insert(0) += count;
        }
    }

    buckets
}

/// Pick the resolution to plot
///
/// With [`ResolutionPolicy::Auto`], resolutions are tried finest first and the
/// first one with at most `max_points` buckets wins. Fails with
/// [`Error::TooManyPoints`] when even the yearly buckets exceed the budget.
pub fn select_resolution(
    buckets: &BucketedCounts,
    policy: ResolutionPolicy,
) -> Result<Resolution> {
    match policy {
        ResolutionPolicy::Explicit(resolution) => Ok(resolution),
        ResolutionPolicy::Auto { max_points } => Resolution::ALL
            .into_iter()
            .find(|resolution| buckets.get(*resolution).len() <= max_points)
            .ok_or(Error::TooManyPoints {
                buckets: buckets.year.len(),
                max_points,
            }),
    }
}

/// Chart payload for `resolution`, ascending by period
pub fn plot_data(buckets: &BucketedCounts, resolution: Resolution) -> ChartData {
    let counts = buckets.get(resolution);
    ChartData {
        labels: counts.keys().map(|start| resolution.label(*start)).collect(),
        values: counts.values().copied().collect(),
        resolution,
    }
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}
