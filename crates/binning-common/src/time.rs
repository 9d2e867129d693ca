//! Time handling: date parsing, time ranges and spatial data-day periods.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BinningError, Result};

/// Parse a UTC date.
///
/// Supports RFC 3339, `yyyy-MM-dd HH:mm:ss`, `yyyy-MM-ddTHH:mm:ss`
/// and a bare `yyyy-MM-dd` (midnight).
pub fn parse_date_utc(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(BinningError::InvalidTime(format!(
        "unparseable date '{}', expected yyyy-MM-dd or yyyy-MM-dd HH:mm:ss",
        s
    )))
}

/// An optionally open time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// True if the instant lies inside the range (bounds inclusive).
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| t >= start) && self.end.map_or(true, |end| t <= end)
    }

    /// Check a product acquisition span against this range.
    ///
    /// A product without any time is accepted. With both times the spans
    /// must overlap; with only one time that instant must lie inside.
    pub fn matches(
        &self,
        product_start: Option<DateTime<Utc>>,
        product_end: Option<DateTime<Utc>>,
    ) -> bool {
        match (product_start, product_end) {
            (None, None) => true,
            (Some(t), None) | (None, Some(t)) => self.contains(t),
            (Some(ps), Some(pe)) => {
                self.start.map_or(true, |start| pe >= start)
                    && self.end.map_or(true, |end| ps <= end)
            }
        }
    }
}

/// Position of an observation relative to a data period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodMembership {
    Previous,
    Current,
    Subsequent,
}

/// A spatial data-day period.
///
/// The period of a location starts at `start + (min_data_hour - lon / 15)`
/// hours local solar time and lasts `duration_days` days, so that one
/// satellite overpass of a location ends up in a single period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPeriod {
    pub start: DateTime<Utc>,
    pub duration_days: f64,
    pub min_data_hour: f64,
}

impl DataPeriod {
    pub fn new(start: DateTime<Utc>, duration_days: f64, min_data_hour: f64) -> Self {
        Self {
            start,
            duration_days,
            min_data_hour,
        }
    }

    fn hours(h: f64) -> Duration {
        Duration::milliseconds((h * 3_600_000.0).round() as i64)
    }

    /// Start of the period at the given longitude.
    pub fn period_start(&self, lon: f64) -> DateTime<Utc> {
        self.start + Self::hours(self.min_data_hour - lon / 15.0)
    }

    /// End of the period at the given longitude.
    pub fn period_end(&self, lon: f64) -> DateTime<Utc> {
        self.period_start(lon) + Self::hours(self.duration_days * 24.0)
    }

    pub fn membership(&self, lon: f64, time: DateTime<Utc>) -> PeriodMembership {
        if time < self.period_start(lon) {
            PeriodMembership::Previous
        } else if time > self.period_end(lon) {
            PeriodMembership::Subsequent
        } else {
            PeriodMembership::Current
        }
    }
}
