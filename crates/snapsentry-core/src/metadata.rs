// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Codec between flat string→string metadata maps and typed records.
//!
//! The backend stores every tag value as a string, so deserialization coerces strings into
//! booleans, integers, and RFC 3339 timestamps. Missing keys leave the target field at its
//! default; unknown keys are ignored. Serialization is symmetric, with integers and booleans
//! formatted canonically and an absent timestamp serialized as the empty string.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{de::DeserializeOwned, Deserialize};
use serde_with::{serde_as, DisplayFromStr, NoneAsEmptyString};

use crate::types::PolicyType;

/// Error returned when a metadata map does not decode into the requested record.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode metadata tags: {0}")]
pub struct MetadataError(#[from] serde_json::Error);

/// Deserializes a string→string metadata map into a typed record.
///
/// Field names map one-to-one onto the external tag namespace via serde renames on the target
/// type. String values are weakly coerced into the field types through their `FromStr`
/// implementations.
pub fn parse_tags<T: DeserializeOwned>(tags: &HashMap<String, String>) -> Result<T, MetadataError> {
    let value = serde_json::to_value(tags).expect("a string map always serializes to a value");
    Ok(serde_json::from_value(value)?)
}

/// The record persisted on every created snapshot.
///
/// It is written once at creation time, never mutated, and destroyed with the snapshot. The
/// expiry workflow relies solely on [`managed`][Self::managed] and
/// [`expiry_date`][Self::expiry_date]; the remaining fields are stored for reference.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SnapshotMetadata {
    /// True for snapshots owned by SnapSentry; the expiry workflow ignores everything else.
    #[serde(rename = "x-snapsentry-snapshot-managed", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub managed: bool,

    /// The instant after which the snapshot is eligible for deletion, in UTC.
    ///
    /// Computed at creation time as the window start plus the retention period.
    #[serde(rename = "x-snapsentry-snapshot-expiry-date", default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub expiry_date: Option<DateTime<Utc>>,

    /// The schedule kind that produced the snapshot.
    #[serde(rename = "x-snapsentry-snapshot-policy-type", default)]
    #[serde_as(as = "NoneAsEmptyString")]
    pub policy_type: Option<PolicyType>,

    /// The retention period the policy was configured with, in days.
    #[serde(rename = "x-snapsentry-snapshot-retention-days", default)]
    #[serde_as(as = "DisplayFromStr")]
    pub retention_days: u32,
}

impl SnapshotMetadata {
    /// Serializes the record into metadata tags.
    ///
    /// The expiry instant is persisted twice: once in UTC and once in the policy's zone, so that
    /// operators inspecting the backend see the wall-clock time they configured.
    pub fn to_tags(&self, zone: Tz) -> HashMap<String, String> {
        let (expiry_utc, expiry_local) = match self.expiry_date {
            Some(instant) => (
                instant.to_rfc3339_opts(SecondsFormat::Secs, true),
                instant
                    .with_timezone(&zone)
                    .to_rfc3339_opts(SecondsFormat::Secs, false),
            ),
            None => (String::new(), String::new()),
        };

        HashMap::from([
            (
                "x-snapsentry-snapshot-managed".to_string(),
                self.managed.to_string(),
            ),
            ("x-snapsentry-snapshot-expiry-date".to_string(), expiry_utc),
            (
                "x-snapsentry-snapshot-expiry-date-user-tz".to_string(),
                expiry_local,
            ),
            (
                "x-snapsentry-snapshot-policy-type".to_string(),
                self.policy_type.map(|p| p.to_string()).unwrap_or_default(),
            ),
            (
                "x-snapsentry-snapshot-retention-days".to_string(),
                self.retention_days.to_string(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use snapsentry_test_utils::param_test;

    use super::*;

    fn tags(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_fully_populated_snapshot_metadata() {
        let parsed: SnapshotMetadata = parse_tags(&tags(&[
            ("x-snapsentry-snapshot-managed", "true"),
            ("x-snapsentry-snapshot-expiry-date", "2025-12-28T13:00:00Z"),
            ("x-snapsentry-snapshot-policy-type", "daily"),
            ("x-snapsentry-snapshot-retention-days", "7"),
        ]))
        .expect("tags decode");

        assert!(parsed.managed);
        assert_eq!(
            parsed.expiry_date,
            Some(Utc.with_ymd_and_hms(2025, 12, 28, 13, 0, 0).unwrap())
        );
        assert_eq!(parsed.policy_type, Some(PolicyType::Daily));
        assert_eq!(parsed.retention_days, 7);
    }

    #[test]
    fn missing_keys_default_and_unknown_keys_are_ignored() {
        let parsed: SnapshotMetadata = parse_tags(&tags(&[
            ("billing-code", "acme-777"),
            ("x-snapsentry-snapshot-managed", "true"),
        ]))
        .expect("tags decode");

        assert!(parsed.managed);
        assert_eq!(parsed.expiry_date, None);
        assert_eq!(parsed.policy_type, None);
        assert_eq!(parsed.retention_days, 0);
    }

    #[test]
    fn empty_map_parses_to_defaults() {
        let parsed: SnapshotMetadata = parse_tags(&HashMap::new()).expect("empty map decodes");
        assert_eq!(parsed, SnapshotMetadata::default());
    }

    param_test! {
        malformed_value_is_an_error: [
            bad_bool: ("x-snapsentry-snapshot-managed", "yes"),
            bad_int: ("x-snapsentry-snapshot-retention-days", "seven"),
            bad_timestamp: ("x-snapsentry-snapshot-expiry-date", "next tuesday"),
            bad_policy: ("x-snapsentry-snapshot-policy-type", "hourly"),
        ]
    }
    fn malformed_value_is_an_error(key: &str, value: &str) {
        let result: Result<SnapshotMetadata, _> = parse_tags(&tags(&[(key, value)]));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_expiry_in_utc_and_policy_zone() {
        let expiry = Utc.with_ymd_and_hms(2025, 12, 28, 13, 0, 0).unwrap();
        let metadata = SnapshotMetadata {
            managed: true,
            expiry_date: Some(expiry),
            policy_type: Some(PolicyType::Daily),
            retention_days: 7,
        };

        let tags = metadata.to_tags(chrono_tz::Europe::Paris);
        assert_eq!(
            tags.get("x-snapsentry-snapshot-expiry-date").unwrap(),
            "2025-12-28T13:00:00Z"
        );
        assert_eq!(
            tags.get("x-snapsentry-snapshot-expiry-date-user-tz")
                .unwrap(),
            "2025-12-28T14:00:00+01:00"
        );
        assert_eq!(
            tags.get("x-snapsentry-snapshot-policy-type").unwrap(),
            "daily"
        );
        assert_eq!(tags.get("x-snapsentry-snapshot-managed").unwrap(), "true");
    }

    #[test]
    fn absent_expiry_serializes_to_empty_string() {
        let tags = SnapshotMetadata::default().to_tags(chrono_tz::UTC);
        assert_eq!(tags.get("x-snapsentry-snapshot-expiry-date").unwrap(), "");
        assert_eq!(
            tags.get("x-snapsentry-snapshot-expiry-date-user-tz").unwrap(),
            ""
        );
    }

    #[test]
    fn default_record_round_trips_through_tags() {
        let parsed: SnapshotMetadata =
            parse_tags(&SnapshotMetadata::default().to_tags(chrono_tz::UTC)).expect("tags decode");
        assert_eq!(parsed, SnapshotMetadata::default());
    }

    #[test]
    fn round_trips_through_tags() {
        let metadata = SnapshotMetadata {
            managed: true,
            expiry_date: Some(Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap()),
            policy_type: Some(PolicyType::Monthly),
            retention_days: 90,
        };

        let parsed: SnapshotMetadata =
            parse_tags(&metadata.to_tags(chrono_tz::UTC)).expect("tags decode");
        assert_eq!(parsed, metadata);
    }
}
