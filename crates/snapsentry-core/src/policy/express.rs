// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Express schedule: high-frequency snapshots in fixed intra-day buckets.
//!
//! The day is divided into fixed buckets starting at midnight in the configured zone and
//! repeating every `interval_hours`; only intervals that divide the day evenly into more than one
//! bucket are supported (6, 8, or 12 hours).

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr};

use super::{
    default_zone, normalize_retention_days, normalize_timezone, snapshot_metadata, PolicyError,
    SnapshotPolicy,
};
use crate::{
    metadata::{parse_tags, MetadataError},
    types::{EvaluationResult, PolicyType, SnapshotInfo, MANAGED_TAG},
    window,
};

const DEFAULT_RETENTION_DAYS: i64 = 1;
const VALID_INTERVALS: [i64; 3] = [6, 8, 12];

/// Express snapshot schedule.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
pub struct ExpressPolicy {
    /// Master switch for this policy.
    #[serde(rename = "x-snapsentry-express-enabled", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub enabled: bool,
    /// Bucket size in hours; one of 6, 8, or 12. Zero coerces to 6.
    #[serde(rename = "x-snapsentry-express-interval-hours", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub interval_hours: i64,
    /// How long the snapshot is kept, in days. Defaults to 1 when not positive.
    #[serde(rename = "x-snapsentry-express-retention-days", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub retention_days: i64,
    /// Opaque retention classifier, preserved as-is.
    #[serde(rename = "x-snapsentry-express-retention-type", default)]
    pub retention_type: String,
    /// IANA timezone name. Defaults to UTC.
    #[serde(rename = "x-snapsentry-express-timezone", default)]
    pub time_zone: String,

    #[serde(skip, default = "default_zone")]
    zone: Tz,
}

impl Default for ExpressPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: 0,
            retention_days: 0,
            retention_type: String::new(),
            time_zone: String::new(),
            zone: default_zone(),
        }
    }
}

impl ExpressPolicy {
    /// Creates a policy from explicit configuration, as the subscribe workflow does.
    pub fn new(
        enabled: bool,
        retention_days: i64,
        time_zone: impl Into<String>,
        interval_hours: i64,
    ) -> Self {
        Self {
            enabled,
            interval_hours,
            retention_days,
            retention_type: "time".to_string(),
            time_zone: time_zone.into(),
            ..Self::default()
        }
    }

    /// Hydrates the policy from a volume's metadata tags.
    pub fn from_tags(tags: &HashMap<String, String>) -> Result<Self, MetadataError> {
        parse_tags(tags)
    }
}

impl SnapshotPolicy for ExpressPolicy {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Express
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

        if self.interval_hours == 0 {
            self.interval_hours = 6;
        }
        if !VALID_INTERVALS.contains(&self.interval_hours) {
            return Err(PolicyError::InvalidInterval(self.interval_hours));
        }

        self.retention_days = normalize_retention_days(self.retention_days, DEFAULT_RETENTION_DAYS);

        Ok(())
    }

    fn to_tags(&self) -> HashMap<String, String> {
        HashMap::from([
            (MANAGED_TAG.to_string(), "true".to_string()),
            (
                "x-snapsentry-express-enabled".to_string(),
                self.enabled.to_string(),
            ),
            (
                "x-snapsentry-express-interval-hours".to_string(),
                self.interval_hours.to_string(),
            ),
            (
                "x-snapsentry-express-retention-days".to_string(),
                self.retention_days.to_string(),
            ),
            (
                "x-snapsentry-express-retention-type".to_string(),
                self.retention_type.clone(),
            ),
            (
                "x-snapsentry-express-timezone".to_string(),
                self.time_zone.clone(),
            ),
        ])
    }

    fn evaluate(
        &self,
        now: DateTime<Utc>,
        last_snapshot: Option<&SnapshotInfo>,
    ) -> EvaluationResult {
        if !self.enabled {
            return EvaluationResult::skip(None, "express snapshot policy is disabled");
        }

        let reference = now.with_timezone(&self.zone);

        // Bucket anchors are fixed: midnight plus whole multiples of the interval.
        let slot_hour = (i64::from(reference.hour()) / self.interval_hours) * self.interval_hours;
        let slot = NaiveTime::from_hms_opt(slot_hour as u32, 0, 0)
            .expect("slot hour is always less than 24");
        let window_start = window::zoned(self.zone, reference.date_naive().and_time(slot));

        let mut result = window::evaluate_window(
            reference,
            window_start,
            Duration::hours(self.interval_hours),
            last_snapshot,
        );
        if result.should_snapshot {
            if let Some(window) = result.window {
                result.metadata = Some(snapshot_metadata(
                    PolicyType::Express,
                    self.retention_days,
                    window.start,
                ));
            }
        }
        result
    }
}
