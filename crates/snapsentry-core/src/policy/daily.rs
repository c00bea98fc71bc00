// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Daily schedule: one snapshot per 24-hour window anchored at a configured time of day.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{
    default_zone, normalize_retention_days, normalize_start_time, normalize_timezone,
    snapshot_metadata, PolicyError, SnapshotPolicy,
};
use crate::{
    metadata::{parse_tags, MetadataError},
    types::{EvaluationResult, PolicyType, SnapshotInfo, MANAGED_TAG},
    window,
};

const DEFAULT_RETENTION_DAYS: i64 = 2;

/// Daily snapshot schedule.
///
/// The valid window is exactly 24 hours starting from the configured time of day in the
/// configured zone. Before the configured time, the window that started yesterday is the one
/// under evaluation, which yields catch-up behaviour after a missed run.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct DailyPolicy {
    /// Master switch for this policy.
    #[serde(rename = "x-snapsentry-daily-enabled", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub enabled: bool,
    /// How long the snapshot is kept, in days. Defaults to 2 when not positive.
    #[serde(rename = "x-snapsentry-daily-retention-days", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub retention_days: i64,
    /// Opaque retention classifier, preserved as-is.
    #[serde(rename = "x-snapsentry-daily-retention-type", default)]
    pub retention_type: String,
    /// IANA timezone name. Defaults to UTC.
    #[serde(rename = "x-snapsentry-daily-timezone", default)]
    pub time_zone: String,
    /// Trigger time of day, "HH:MM" or "HH:MM:SS". Defaults to midnight.
    #[serde(rename = "x-snapsentry-daily-start-time", default)]
    pub start_time: String,

    #[serde(skip, default = "default_zone")]
    zone: Tz,
    #[serde(skip)]
    start: NaiveTime,
}

impl Default for DailyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: 0,
            retention_type: String::new(),
            time_zone: String::new(),
            start_time: String::new(),
            zone: default_zone(),
            start: NaiveTime::MIN,
        }
    }
}

impl DailyPolicy {
    /// Creates a policy from explicit configuration, as the subscribe workflow does.
    pub fn new(
        enabled: bool,
        retention_days: i64,
        start_time: impl Into<String>,
        time_zone: impl Into<String>,
    ) -> Self {
        Self {
            enabled,
            retention_days,
            retention_type: "time".to_string(),
            time_zone: time_zone.into(),
            start_time: start_time.into(),
            ..Self::default()
        }
    }

    /// Hydrates the policy from a volume's metadata tags.
    pub fn from_tags(tags: &HashMap<String, String>) -> Result<Self, MetadataError> {
        parse_tags(tags)
    }
}

impl SnapshotPolicy for DailyPolicy {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Daily
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

        Ok(())
    }

    fn to_tags(&self) -> HashMap<String, String> {
        HashMap::from([
            (MANAGED_TAG.to_string(), "true".to_string()),
            (
                "x-snapsentry-daily-enabled".to_string(),
                self.enabled.to_string(),
            ),
            (
                "x-snapsentry-daily-retention-days".to_string(),
                self.retention_days.to_string(),
            ),
            (
                "x-snapsentry-daily-retention-type".to_string(),
                self.retention_type.clone(),
            ),
            (
                "x-snapsentry-daily-timezone".to_string(),
                self.time_zone.clone(),
            ),
            (
                "x-snapsentry-daily-start-time".to_string(),
                self.start_time.clone(),
            ),
        ])
    }

    fn evaluate(
        &self,
        now: DateTime<Utc>,
        last_snapshot: Option<&SnapshotInfo>,
    ) -> EvaluationResult {
        if !self.enabled {
            return EvaluationResult::skip(None, "daily snapshot policy is disabled");
        }

        let reference = now.with_timezone(&self.zone);
        let today_start = window::zoned(self.zone, reference.date_naive().and_time(self.start));

        let mut result =
            window::evaluate_window(reference, today_start, Duration::hours(24), last_snapshot);
        if result.should_snapshot {
            if let Some(window) = result.window {
                result.metadata = Some(snapshot_metadata(
                    PolicyType::Daily,
                    self.retention_days,
                    window.start,
                ));
            }
        }
        result
    }
}
