// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared types used across the policy engine and the workflows.

use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::metadata::SnapshotMetadata;

/// The presence tag that marks a volume as subscribed to snapshot management.
pub const MANAGED_TAG: &str = "x-snapsentry-managed";

/// The four schedule kinds a volume may carry, in no particular order.
///
/// Use [`EVALUATION_ORDER`][Self::EVALUATION_ORDER] when iterating during creation; the order is
/// fixed so that the highest-frequency policy is considered first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Express,
    Daily,
    Weekly,
    Monthly,
}

impl PolicyType {
    /// The fixed order in which policies are evaluated for a single volume.
    pub const EVALUATION_ORDER: [PolicyType; 4] = [
        PolicyType::Express,
        PolicyType::Daily,
        PolicyType::Weekly,
        PolicyType::Monthly,
    ];

    /// The canonical lowercase identifier persisted in snapshot metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Express => "express",
            PolicyType::Daily => "daily",
            PolicyType::Weekly => "weekly",
            PolicyType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognised policy-type identifier.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown policy type '{0}'")]
pub struct UnknownPolicyType(String);

impl FromStr for PolicyType {
    type Err = UnknownPolicyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "express" => Ok(PolicyType::Express),
            "daily" => Ok(PolicyType::Daily),
            "weekly" => Ok(PolicyType::Weekly),
            "monthly" => Ok(PolicyType::Monthly),
            other => Err(UnknownPolicyType(other.to_string())),
        }
    }
}

/// A single attachment of a volume to a virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeAttachment {
    /// The id of the server the volume is attached to.
    pub server_id: String,
}

/// The observable fields of a volume that the workflows operate on.
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    /// Opaque backend identifier.
    pub id: String,
    /// Human-readable volume name.
    pub name: String,
    /// The full metadata map, including policy tags and unrelated keys.
    pub metadata: HashMap<String, String>,
    /// Attachments in backend order; empty for unattached volumes.
    pub attachments: Vec<VolumeAttachment>,
}

/// The observable fields of a snapshot, used both for listings and as the most recent prior
/// snapshot during evaluation.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInfo {
    /// Opaque backend identifier.
    pub id: String,
    /// The volume this snapshot was taken from.
    pub volume_id: String,
    /// Backend status string; the workflows only consider "available" snapshots.
    pub status: String,
    /// Creation instant reported by the backend.
    pub created_at: DateTime<Utc>,
    /// The snapshot's metadata map.
    pub metadata: HashMap<String, String>,
}

/// A half-open interval `[start, end)` in the policy's timezone during which at most one snapshot
/// of the policy's kind is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyWindow {
    /// Inclusive start of the window.
    pub start: DateTime<Tz>,
    /// Exclusive end of the window.
    pub end: DateTime<Tz>,
}

impl PolicyWindow {
    /// Returns true when the instant falls inside the half-open window.
    pub fn contains<T: chrono::TimeZone>(&self, instant: DateTime<T>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// The length of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl fmt::Display for PolicyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// The outcome of evaluating one policy against a reference instant.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    /// Whether a snapshot must be created now.
    pub should_snapshot: bool,
    /// The active window under evaluation; absent only when the policy is disabled.
    pub window: Option<PolicyWindow>,
    /// The metadata to persist on the created snapshot; populated only on a take decision.
    pub metadata: Option<SnapshotMetadata>,
    /// Human-readable explanation of the decision, for logs.
    pub reason: String,
}

impl EvaluationResult {
    pub(crate) fn skip(window: Option<PolicyWindow>, reason: impl Into<String>) -> Self {
        Self {
            should_snapshot: false,
            window,
            metadata: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn take(window: PolicyWindow, reason: impl Into<String>) -> Self {
        Self {
            should_snapshot: true,
            window: Some(window),
            metadata: None,
            reason: reason.into(),
        }
    }
}
