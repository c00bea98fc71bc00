// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The expiry workflow: sweep managed snapshots and delete those past their recorded expiry.
//!
//! The sweep is strictly sequential and best-effort: a snapshot whose deletion fails is simply
//! left for the next sweep, and a snapshot whose metadata does not parse is skipped, never
//! deleted.

use chrono::{DateTime, Utc};
use snapsentry_client::BackendError;
use snapsentry_core::{parse_tags, SnapshotInfo, SnapshotMetadata};
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::SnapshotBackend;

/// Counters reported at the end of an expiry sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExpirySummary {
    /// Snapshots deleted because their expiry passed.
    pub deleted: u32,
    /// Snapshots still inside their retention period.
    pub retained: u32,
    /// Snapshots skipped because their metadata was missing or unparsable.
    pub skipped: u32,
    /// Snapshots whose deletion failed; they remain for the next sweep.
    pub failed: u32,
}

/// Runs the end-to-end expiry workflow.
///
/// `now` is the reference instant for expiry comparisons; callers normally pass the current UTC
/// time but may inject a fixed instant for deterministic runs.
pub async fn run_expiry_workflow<B: SnapshotBackend + ?Sized>(
    backend: &B,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
) -> Result<ExpirySummary, BackendError> {
    let run_id = Uuid::new_v4();
    tracing::info!(run_id = %run_id, validation_time = %now, "initializing snapshot expiry workflow");

    let snapshots = backend.list_managed_snapshots(deadline).await?;
    tracing::info!(run_id = %run_id, count = snapshots.len(), "managed snapshots discovered");

    let mut summary = ExpirySummary::default();
    for snapshot in snapshots {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!("workflow deadline reached; stopping the expiry sweep early");
            break;
        }
        process_snapshot_expiry(backend, &snapshot, now, deadline, &mut summary).await;
    }

    tracing::info!(
        run_id = %run_id,
        deleted = summary.deleted,
        retained = summary.retained,
        skipped = summary.skipped,
        failed = summary.failed,
        "expiry workflow completed"
    );
    Ok(summary)
}

async fn process_snapshot_expiry<B: SnapshotBackend + ?Sized>(
    backend: &B,
    snapshot: &SnapshotInfo,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
    summary: &mut ExpirySummary,
) {
    let metadata = match parse_tags::<SnapshotMetadata>(&snapshot.metadata) {
        Ok(metadata) => metadata,
        Err(error) => {
            tracing::warn!(snapshot_id = %snapshot.id, %error, "skipping snapshot: invalid metadata");
            summary.skipped += 1;
            return;
        }
    };

    let Some(expiry_date) = metadata.expiry_date else {
        tracing::warn!(snapshot_id = %snapshot.id, "skipping snapshot: no expiry date recorded");
        summary.skipped += 1;
        return;
    };

    if now < expiry_date {
        tracing::debug!(snapshot_id = %snapshot.id, expires_at = %expiry_date, "snapshot is inside its retention period");
        summary.retained += 1;
        return;
    }

    tracing::info!(snapshot_id = %snapshot.id, volume_id = %snapshot.volume_id, expires_at = %expiry_date, "snapshot has expired");
    match backend.delete_snapshot(deadline, &snapshot.id).await {
        Ok(request_id) => {
            tracing::info!(
                snapshot_id = %snapshot.id,
                request_id = request_id.as_deref().unwrap_or(""),
                "snapshot deleted"
            );
            summary.deleted += 1;
        }
        Err(error) => {
            tracing::error!(snapshot_id = %snapshot.id, %error, "failed to delete snapshot");
            summary.failed += 1;
        }
    }
}
