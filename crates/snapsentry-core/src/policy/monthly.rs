// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Monthly schedule: one snapshot per calendar-month window anchored at a day of month.
//!
//! Months vary in length, so the window boundaries are computed as two explicit anchors rather
//! than a fixed duration, and a requested day beyond the end of a month is clamped to its last
//! day (the 31st triggers on Feb 28th, or the 29th in a leap year).

use std::collections::HashMap;

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{
    default_zone, monthly_anchor, normalize_retention_days, normalize_start_time,
    normalize_timezone, snapshot_metadata, PolicyError, SnapshotPolicy,
};
use crate::{
    metadata::{parse_tags, MetadataError},
    types::{EvaluationResult, PolicyType, SnapshotInfo, MANAGED_TAG},
    window,
};

const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Monthly snapshot schedule.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyPolicy {
    /// Master switch for this policy.
    #[serde(rename = "x-snapsentry-monthly-enabled", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub enabled: bool,
    /// How long the snapshot is kept, in days. Defaults to 30 when not positive.
    #[serde(rename = "x-snapsentry-monthly-retention-days", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub retention_days: i64,
    /// Opaque retention classifier, preserved as-is.
    #[serde(rename = "x-snapsentry-monthly-retention-type", default)]
    pub retention_type: String,
    /// IANA timezone name. Defaults to UTC.
    #[serde(rename = "x-snapsentry-monthly-timezone", default)]
    pub time_zone: String,
    /// Trigger time of day, "HH:MM" or "HH:MM:SS". Defaults to midnight.
    #[serde(rename = "x-snapsentry-monthly-start-time", default)]
    pub start_time: String,
    /// Target calendar day, clamped into 1-31 and then into each month's length.
    #[serde(rename = "x-snapsentry-monthly-day-of-month", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub day_of_month: i64,

    #[serde(skip, default = "default_zone")]
    zone: Tz,
    #[serde(skip)]
    start: NaiveTime,
}

impl Default for MonthlyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: 0,
            retention_type: String::new(),
            time_zone: String::new(),
            start_time: String::new(),
            day_of_month: 0,
            zone: default_zone(),
            start: NaiveTime::MIN,
        }
    }
}

impl MonthlyPolicy {
    /// Creates a policy from explicit configuration, as the subscribe workflow does.
    pub fn new(
        enabled: bool,
        retention_days: i64,
        start_time: impl Into<String>,
        time_zone: impl Into<String>,
        day_of_month: i64,
    ) -> Self {
        Self {
            enabled,
            retention_days,
            retention_type: "count".to_string(),
            time_zone: time_zone.into(),
            start_time: start_time.into(),
            day_of_month,
            ..Self::default()
        }
    }

    /// Hydrates the policy from a volume's metadata tags.
    pub fn from_tags(tags: &HashMap<String, String>) -> Result<Self, MetadataError> {
        parse_tags(tags)
    }
}

impl SnapshotPolicy for MonthlyPolicy {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Monthly
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

        self.day_of_month = self.day_of_month.clamp(1, 31);

        Ok(())
    }

    fn to_tags(&self) -> HashMap<String, String> {
        HashMap::from([
            (MANAGED_TAG.to_string(), "true".to_string()),
            (
                "x-snapsentry-monthly-enabled".to_string(),
                self.enabled.to_string(),
            ),
            (
                "x-snapsentry-monthly-retention-days".to_string(),
                self.retention_days.to_string(),
            ),
            (
                "x-snapsentry-monthly-retention-type".to_string(),
                self.retention_type.clone(),
            ),
            (
                "x-snapsentry-monthly-timezone".to_string(),
                self.time_zone.clone(),
            ),
            (
                "x-snapsentry-monthly-start-time".to_string(),
                self.start_time.clone(),
            ),
            (
                "x-snapsentry-monthly-day-of-month".to_string(),
                self.day_of_month.to_string(),
            ),
        ])
    }

    fn evaluate(
        &self,
        now: DateTime<Utc>,
        last_snapshot: Option<&SnapshotInfo>,
    ) -> EvaluationResult {
        if !self.enabled {
            return EvaluationResult::skip(None, "monthly snapshot policy is disabled");
        }

        let reference = now.with_timezone(&self.zone);
        let this_month_target = monthly_anchor(
            self.zone,
            reference.year(),
            reference.month() as i32,
            self.day_of_month,
            self.start,
        );

        // Monthly windows vary in length, so both boundaries are computed explicitly instead of
        // subtracting a fixed duration. Before this month's trigger the active window is last
        // month's; afterwards it runs until next month's trigger.
        let (window_start, next_window_start) = if reference < this_month_target {
            let previous = monthly_anchor(
                self.zone,
                reference.year(),
                reference.month() as i32 - 1,
                self.day_of_month,
                self.start,
            );
            (previous, this_month_target)
        } else {
            let next = monthly_anchor(
                self.zone,
                reference.year(),
                reference.month() as i32 + 1,
                self.day_of_month,
                self.start,
            );
            (this_month_target, next)
        };

        let duration = next_window_start - window_start;
        let mut result =
            window::evaluate_window(reference, window_start, duration, last_snapshot);
        if result.should_snapshot {
            if let Some(window) = result.window {
                result.metadata = Some(snapshot_metadata(
                    PolicyType::Monthly,
                    self.retention_days,
                    window.start,
                ));
            }
        }
        result
    }
}
