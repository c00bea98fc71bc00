// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The four schedule kinds and the contract they share.
//!
//! Each policy is hydrated from volume metadata tags, validated and defaulted by
//! [`normalize`][SnapshotPolicy::normalize], and then evaluated against a reference instant.
//! `normalize` is the only mutator; evaluation is pure.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::{
    metadata::{MetadataError, SnapshotMetadata},
    types::{EvaluationResult, PolicyType, SnapshotInfo},
    window,
};

mod daily;
mod express;
mod monthly;
mod weekly;

pub use daily::DailyPolicy;
pub use express::ExpressPolicy;
pub use monthly::MonthlyPolicy;
pub use weekly::WeeklyPolicy;

/// Error raised when a policy's configuration does not normalize.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The timezone tag is not a known IANA zone name.
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),
    /// The start-time tag is not of the form HH:MM or HH:MM:SS.
    #[error("invalid start time '{0}': expected HH:MM or HH:MM:SS")]
    InvalidStartTime(String),
    /// The weekly day tag is not a weekday name, abbreviation, or digit 0-6.
    #[error("invalid day of week '{0}'")]
    InvalidDayOfWeek(String),
    /// The express interval is outside the supported bucket sizes.
    #[error("express interval must be 6, 8, or 12 hours; got {0}")]
    InvalidInterval(i64),
}

/// The contract all scheduling strategies implement.
///
/// It decouples the scheduling logic from the storage backend: policies only ever see metadata
/// maps, a reference instant, and the most recent prior snapshot.
pub trait SnapshotPolicy: fmt::Debug + Send + Sync {
    /// The unique identifier of this schedule kind.
    fn policy_type(&self) -> PolicyType;

    /// Whether the policy is switched on in the volume's configuration.
    fn is_enabled(&self) -> bool;

    /// The configured retention period in days, meaningful after `normalize`.
    fn retention_days(&self) -> i64;

    /// Validates the configuration and fills in defaults.
    ///
    /// Must be called before [`evaluate`][Self::evaluate]; an error means the configuration is
    /// invalid and the policy must be skipped for this volume.
    fn normalize(&mut self) -> Result<(), PolicyError>;

    /// Serializes the configuration into volume metadata tags, including the management tag.
    fn to_tags(&self) -> HashMap<String, String>;

    /// Decides whether a snapshot should be triggered at `now`.
    ///
    /// `last_snapshot` is the most recent prior snapshot of this policy's kind, used to keep the
    /// decision idempotent within a window.
    fn evaluate(&self, now: DateTime<Utc>, last_snapshot: Option<&SnapshotInfo>)
        -> EvaluationResult;
}

/// Hydrates the policy of the given kind from a volume's metadata tags.
pub fn policy_from_tags(
    kind: PolicyType,
    tags: &HashMap<String, String>,
) -> Result<Box<dyn SnapshotPolicy>, MetadataError> {
    Ok(match kind {
        PolicyType::Express => Box::new(ExpressPolicy::from_tags(tags)?),
        PolicyType::Daily => Box::new(DailyPolicy::from_tags(tags)?),
        PolicyType::Weekly => Box::new(WeeklyPolicy::from_tags(tags)?),
        PolicyType::Monthly => Box::new(MonthlyPolicy::from_tags(tags)?),
    })
}

pub(crate) fn default_zone() -> Tz {
    Tz::UTC
}

/// Loads a timezone from its IANA name, defaulting to UTC when empty.
///
/// Returns the canonical name alongside the zone so the stored tag can be rewritten.
pub(crate) fn normalize_timezone(name: &str) -> Result<(String, Tz), PolicyError> {
    let name = if name.is_empty() { "UTC" } else { name };
    let zone = name
        .parse::<Tz>()
        .map_err(|_| PolicyError::InvalidTimezone(name.to_string()))?;
    Ok((name.to_string(), zone))
}

/// Clamps the retention period to a kind-specific default when not positive.
pub(crate) fn normalize_retention_days(days: i64, default: i64) -> i64 {
    if days <= 0 {
        default
    } else {
        days
    }
}

/// Parses a start time accepting "HH:MM" and "HH:MM:SS"; empty defaults to midnight.
pub(crate) fn normalize_start_time(raw: &str) -> Result<NaiveTime, PolicyError> {
    if raw.is_empty() {
        return Ok(NaiveTime::MIN);
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| PolicyError::InvalidStartTime(raw.to_string()))
}

/// Parses a weekday from a full name, a three-letter abbreviation, or a digit "0"-"6" with
/// Sunday as 0. Empty defaults to Sunday.
pub(crate) fn normalize_weekday(raw: &str) -> Result<Weekday, PolicyError> {
    let lower = raw.trim().to_ascii_lowercase();
    match lower.as_str() {
        "" | "0" | "sun" | "sunday" => Ok(Weekday::Sun),
        "1" | "mon" | "monday" => Ok(Weekday::Mon),
        "2" | "tue" | "tuesday" => Ok(Weekday::Tue),
        "3" | "wed" | "wednesday" => Ok(Weekday::Wed),
        "4" | "thu" | "thursday" => Ok(Weekday::Thu),
        "5" | "fri" | "friday" => Ok(Weekday::Fri),
        "6" | "sat" | "saturday" => Ok(Weekday::Sat),
        _ => Err(PolicyError::InvalidDayOfWeek(raw.to_string())),
    }
}

/// The last calendar day of the given month.
pub(crate) fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("the first of a month is always a valid date")
        .pred_opt()
        .expect("the day before the first of a month exists")
        .day()
}

/// Builds the zoned anchor instant for a monthly schedule.
///
/// `month` may be 0 or 13 to address the adjacent year; the requested day is clamped to the last
/// valid day of the target month (e.g. 31 becomes 28 in a non-leap February).
pub(crate) fn monthly_anchor(
    zone: Tz,
    year: i32,
    month: i32,
    day_of_month: i64,
    start: NaiveTime,
) -> DateTime<Tz> {
    let (year, month) = match month {
        0 => (year - 1, 12u32),
        13 => (year + 1, 1u32),
        m => (year, m as u32),
    };
    let day = (day_of_month.clamp(1, 31) as u32).min(last_day_of_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day).expect("clamped day is a valid date");
    window::zoned(zone, date.and_time(start))
}

/// Fills the snapshot metadata emitted after a positive take decision.
pub(crate) fn snapshot_metadata(
    policy_type: PolicyType,
    retention_days: i64,
    window_start: DateTime<Tz>,
) -> SnapshotMetadata {
    SnapshotMetadata {
        managed: true,
        expiry_date: Some(window::add_days(window_start, retention_days).with_timezone(&Utc)),
        policy_type: Some(policy_type),
        retention_days: retention_days as u32,
    }
}
