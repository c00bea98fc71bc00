// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Weekly schedule: one snapshot per 7-day window anchored at a configured weekday and time.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{
    default_zone, normalize_retention_days, normalize_start_time, normalize_timezone,
    normalize_weekday, snapshot_metadata, PolicyError, SnapshotPolicy,
};
use crate::{
    metadata::{parse_tags, MetadataError},
    types::{EvaluationResult, PolicyType, SnapshotInfo, MANAGED_TAG},
    window,
};

const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Weekly snapshot schedule.
///
/// The current date is shifted to the target weekday to find the tentative window start; when
/// that alignment lands in the future (e.g. today is Sunday, target is Monday), the window
/// evaluator shifts back by one week, so a week-old snapshot inside the shifted window still
/// suppresses the take.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct WeeklyPolicy {
    /// Master switch for this policy.
    #[serde(rename = "x-snapsentry-weekly-enabled", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub enabled: bool,
    /// How long the snapshot is kept, in days. Defaults to 7 when not positive.
    #[serde(rename = "x-snapsentry-weekly-retention-days", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub retention_days: i64,
    /// Opaque retention classifier, preserved as-is.
    #[serde(rename = "x-snapsentry-weekly-retention-type", default)]
    pub retention_type: String,
    /// IANA timezone name. Defaults to UTC.
    #[serde(rename = "x-snapsentry-weekly-timezone", default)]
    pub time_zone: String,
    /// Trigger time of day, "HH:MM" or "HH:MM:SS". Defaults to midnight.
    #[serde(rename = "x-snapsentry-weekly-start-time", default)]
    pub start_time: String,
    /// Target day: a weekday name, a three-letter abbreviation, or "0"-"6" with Sunday as 0.
    #[serde(rename = "x-snapsentry-weekly-start-day-of-week", default)]
    pub day_of_week: String,

    #[serde(skip, default = "default_zone")]
    zone: Tz,
    #[serde(skip)]
    start: NaiveTime,
    #[serde(skip, default = "default_weekday")]
    weekday: Weekday,
}

fn default_weekday() -> Weekday {
    Weekday::Sun
}

impl Default for WeeklyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: 0,
            retention_type: String::new(),
            time_zone: String::new(),
            start_time: String::new(),
            day_of_week: String::new(),
            zone: default_zone(),
            start: NaiveTime::MIN,
            weekday: default_weekday(),
        }
    }
}

impl WeeklyPolicy {
    /// Creates a policy from explicit configuration, as the subscribe workflow does.
    pub fn new(
        enabled: bool,
        retention_days: i64,
        start_time: impl Into<String>,
        time_zone: impl Into<String>,
        day_of_week: impl Into<String>,
    ) -> Self {
        Self {
            enabled,
            retention_days,
            retention_type: "count".to_string(),
            time_zone: time_zone.into(),
            start_time: start_time.into(),
            day_of_week: day_of_week.into(),
            ..Self::default()
        }
    }

    /// Hydrates the policy from a volume's metadata tags.
    pub fn from_tags(tags: &HashMap<String, String>) -> Result<Self, MetadataError> {
        parse_tags(tags)
    }
}

impl SnapshotPolicy for WeeklyPolicy {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Weekly
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn retention_days(&self) -> i64 {
        self.retention_days
    }

    fn normalize(&mut self) -> Result<(), PolicyError> {
        let (name, zone) = normalize_timezone(&self.time_zone)?;
        self.time_zone = name;
        self.zone = zone;

        self.retention_days = normalize_retention_days(self.retention_days, DEFAULT_RETENTION_DAYS);

        self.start = normalize_start_time(&self.start_time)?;
        self.start_time = self.start.format("%H:%M").to_string();

        self.weekday = normalize_weekday(&self.day_of_week)?;
        self.day_of_week = weekday_name(self.weekday).to_string();

        Ok(())
    }

    fn to_tags(&self) -> HashMap<String, String> {
        HashMap::from([
            (MANAGED_TAG.to_string(), "true".to_string()),
            (
                "x-snapsentry-weekly-enabled".to_string(),
                self.enabled.to_string(),
            ),
            (
                "x-snapsentry-weekly-retention-days".to_string(),
                self.retention_days.to_string(),
            ),
            (
                "x-snapsentry-weekly-retention-type".to_string(),
                self.retention_type.clone(),
            ),
            (
                "x-snapsentry-weekly-timezone".to_string(),
                self.time_zone.clone(),
            ),
            (
                "x-snapsentry-weekly-start-time".to_string(),
                self.start_time.clone(),
            ),
            (
                "x-snapsentry-weekly-start-day-of-week".to_string(),
                self.day_of_week.clone(),
            ),
        ])
    }

    fn evaluate(
        &self,
        now: DateTime<Utc>,
        last_snapshot: Option<&SnapshotInfo>,
    ) -> EvaluationResult {
        if !self.enabled {
            return EvaluationResult::skip(None, "weekly snapshot policy is disabled");
        }

        let reference = now.with_timezone(&self.zone);

        // Shift today onto the target weekday; the shift is in -6..=6 days and may land in the
        // future, in which case the evaluator looks at the window that started last week.
        let days_to_shift = i64::from(self.weekday.num_days_from_sunday())
            - i64::from(reference.weekday().num_days_from_sunday());
        let aligned_date = reference.date_naive() + Duration::days(days_to_shift);
        let potential_start = window::zoned(self.zone, aligned_date.and_time(self.start));

        let mut result =
            window::evaluate_window(reference, potential_start, Duration::days(7), last_snapshot);
        if result.should_snapshot {
            if let Some(window) = result.window {
                result.metadata = Some(snapshot_metadata(
                    PolicyType::Weekly,
                    self.retention_days,
                    window.start,
                ));
            }
        }
        result
    }
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "sunday",
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Europe::Paris;
    use snapsentry_test_utils::param_test;

    use super::*;

    /// Policy: every Monday at 14:00 Paris. Dec 22, 2025 is a Monday.
    fn monday_policy() -> WeeklyPolicy {
        let mut policy = WeeklyPolicy::new(true, 4, "14:00", "Europe/Paris", "Monday");
        policy.normalize().expect("configuration is valid");
        policy
    }

    fn paris(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Paris
            .with_ymd_and_hms(2025, 12, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn snapshot_at(created_at: DateTime<Utc>) -> SnapshotInfo {
        SnapshotInfo {
            id: "snap-weekly".to_string(),
            created_at,
            status: "available".to_string(),
            ..Default::default()
        }
    }

    mod normalize {
        use super::*;

        param_test! {
            accepted_configurations: [
                full_name: (14, "14:00", "Monday", Weekday::Mon, 14),
                short_lowercase: (7, "09:30", "fri", Weekday::Fri, 7),
                defaults: (0, "", "Sun", Weekday::Sun, 7),
            ]
        }
        fn accepted_configurations(
            retention: i64,
            start_time: &str,
            day: &str,
            expected_weekday: Weekday,
            expected_retention: i64,
        ) {
            let mut policy = WeeklyPolicy::new(true, retention, start_time, "UTC", day);
            policy.normalize().unwrap();
            assert_eq!(policy.weekday, expected_weekday);
            assert_eq!(policy.retention_days, expected_retention);
        }

        param_test! {
            rejected_configurations: [
                invalid_day: ("00:00", "Funday"),
                invalid_time: ("25:00", "Mon"),
            ]
        }
        fn rejected_configurations(start_time: &str, day: &str) {
            let mut policy = WeeklyPolicy::new(true, 7, start_time, "UTC", day);
            assert!(policy.normalize().is_err());
        }

        #[test]
        fn canonicalizes_the_day_name() {
            let mut policy = WeeklyPolicy::new(true, 7, "00:00", "UTC", "FRI");
            policy.normalize().unwrap();
            assert_eq!(policy.day_of_week, "friday");
        }
    }

    mod evaluate {
        use super::*;

        #[test]
        fn takes_on_the_scheduled_day() {
            let last_week = snapshot_at(paris(15, 14, 0));
            let result = monday_policy().evaluate(paris(22, 14, 5), Some(&last_week));
            assert!(result.should_snapshot, "{}", result.reason);

            let window = result.window.unwrap();
            assert_eq!(window.start.to_utc(), paris(22, 14, 0));
            assert_eq!(window.end.to_utc(), paris(29, 14, 0));
        }

        #[test]
        fn recovers_on_tuesday_after_a_missed_monday() {
            let last_week = snapshot_at(paris(15, 14, 0));
            let result = monday_policy().evaluate(paris(23, 10, 0), Some(&last_week));
            assert!(result.should_snapshot, "{}", result.reason);

            let window = result.window.unwrap();
            assert_eq!(window.start.to_utc(), paris(22, 14, 0));
        }

        #[test]
        fn tuesday_is_idempotent_when_monday_ran() {
            let this_week = snapshot_at(paris(22, 14, 5));
            let result = monday_policy().evaluate(paris(23, 10, 0), Some(&this_week));
            assert!(!result.should_snapshot);
            assert!(result.reason.contains("already exists"), "{}", result.reason);
        }

        #[test]
        fn sunday_looks_back_to_last_monday() {
            // Sunday Dec 28: the alignment lands on tomorrow (Dec 29), so the window under
            // evaluation started last Monday (Dec 22). Two-week-old history means take.
            let two_weeks_ago = snapshot_at(paris(15, 14, 0));
            let result = monday_policy().evaluate(paris(28, 10, 0), Some(&two_weeks_ago));
            assert!(result.should_snapshot, "{}", result.reason);

            let window = result.window.unwrap();
            assert_eq!(window.start.to_utc(), paris(22, 14, 0));
        }

        #[test]
        fn monday_morning_defers_to_last_weeks_snapshot() {
            // Monday 10:00, before the 14:00 trigger: the shifted-back window is last Monday's,
            // and last week's snapshot lies inside it, so nothing happens yet.
            let last_week = snapshot_at(paris(15, 14, 5));
            let result = monday_policy().evaluate(paris(22, 10, 0), Some(&last_week));
            assert!(!result.should_snapshot, "{}", result.reason);
            assert!(result.reason.contains("already exists"), "{}", result.reason);
        }

        #[test]
        fn expiry_is_window_start_plus_retention() {
            let result = monday_policy().evaluate(paris(22, 14, 5), None);
            let metadata = result.metadata.unwrap();
            assert_eq!(metadata.expiry_date, Some(paris(26, 14, 0)));
            assert_eq!(metadata.retention_days, 4);
        }
    }
}
