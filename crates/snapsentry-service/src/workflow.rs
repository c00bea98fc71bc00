// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The metadata-driven snapshot workflows.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use snapsentry_core::PolicyType;
use tokio::time::Instant;

pub mod create;
pub mod expire;
pub mod subscribe;

pub use create::run_creation_workflow;
pub use expire::run_expiry_workflow;
pub use subscribe::apply_subscription;

/// Converts an operator-supplied timeout in seconds into a deadline; zero means unbounded.
pub fn deadline_for(timeout_seconds: u64) -> Option<Instant> {
    (timeout_seconds > 0).then(|| Instant::now() + Duration::from_secs(timeout_seconds))
}

/// Builds the deterministic snapshot name `managed-<policyType>-<volumeId>-<windowStart>`.
///
/// The window start is rendered as RFC 3339 in the policy's zone, so the name both identifies
/// the window for idempotency audits and reads naturally for operators.
pub(crate) fn snapshot_name(
    policy_type: PolicyType,
    volume_id: &str,
    window_start: DateTime<Tz>,
) -> String {
    format!(
        "managed-{policy_type}-{volume_id}-{}",
        window_start.to_rfc3339_opts(SecondsFormat::Secs, false)
    )
}

/// Aggregate counters reported at the end of a creation run.
///
/// Workers tally their own outcomes and the counts are merged at the join barrier, so no shared
/// mutable counter state exists across workers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Volumes discovered and handed to workers.
    pub volumes_processed: usize,
    /// Volumes whose policies were all applied without error.
    pub success_count: u32,
    /// Volumes that finished with at least one joined error.
    pub error_count: u32,
}

/// Per-volume error that aggregates the failures of individual policies.
///
/// Policies are evaluated independently: one failing policy never stops the remaining policies
/// on the same volume, and the volume's worker reports all failures together.
#[derive(Debug, thiserror::Error)]
#[error("{}", .errors.join("; "))]
pub struct VolumeProcessingError {
    /// One message per failed policy step.
    pub errors: Vec<String>,
}
