// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The seam between the workflows and the block-storage service.

use std::collections::HashMap;

use async_trait::async_trait;
use snapsentry_client::{BackendError, CreateSnapshotError, StorageGateway};
use snapsentry_core::{PolicyType, SnapshotInfo, VolumeInfo};
use tokio::time::Instant;

/// The block-storage operations the workflows depend on.
///
/// Implementations must be safe to share across concurrent volume workers. Every method accepts
/// an optional caller deadline that bounds the call together with the implementation's own
/// per-operation timeout; in-flight calls observe an expired deadline at their next blocking
/// point.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Lists every volume bearing the management tag.
    async fn list_subscribed_volumes(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<VolumeInfo>, BackendError>;

    /// Lists every "available" snapshot whose metadata marks it as managed.
    async fn list_managed_snapshots(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<SnapshotInfo>, BackendError>;

    /// Returns the most recent "available" snapshot of the given policy kind for a volume.
    async fn latest_policy_snapshot(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        policy_type: PolicyType,
    ) -> Result<Option<SnapshotInfo>, BackendError>;

    /// Creates a snapshot and waits for it to become "available".
    ///
    /// Returns the snapshot and the backend's request-id. On failure the error carries the
    /// best-known snapshot id; callers must delete such orphans.
    async fn create_snapshot(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(SnapshotInfo, Option<String>), CreateSnapshotError>;

    /// Force-deletes a snapshot, returning the backend's request-id once accepted.
    async fn delete_snapshot(
        &self,
        deadline: Option<Instant>,
        snapshot_id: &str,
    ) -> Result<Option<String>, BackendError>;

    /// Read-merge-writes a metadata patch onto a volume, preserving unrelated keys.
    async fn update_volume_metadata(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        patch: HashMap<String, String>,
    ) -> Result<(VolumeInfo, Option<String>), BackendError>;
}

#[async_trait]
impl SnapshotBackend for StorageGateway {
    async fn list_subscribed_volumes(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<VolumeInfo>, BackendError> {
        StorageGateway::list_subscribed_volumes(self, deadline).await
    }

    async fn list_managed_snapshots(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<SnapshotInfo>, BackendError> {
        StorageGateway::list_managed_snapshots(self, deadline).await
    }

    async fn latest_policy_snapshot(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        policy_type: PolicyType,
    ) -> Result<Option<SnapshotInfo>, BackendError> {
        let snapshots = self
            .list_managed_volume_snapshots(deadline, volume_id, policy_type, true)
            .await?;
        Ok(snapshots.into_iter().next())
    }

    async fn create_snapshot(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(SnapshotInfo, Option<String>), CreateSnapshotError> {
        StorageGateway::create_snapshot(self, deadline, volume_id, name, metadata).await
    }

    async fn delete_snapshot(
        &self,
        deadline: Option<Instant>,
        snapshot_id: &str,
    ) -> Result<Option<String>, BackendError> {
        StorageGateway::delete_snapshot(self, deadline, snapshot_id).await
    }

    async fn update_volume_metadata(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        patch: HashMap<String, String>,
    ) -> Result<(VolumeInfo, Option<String>), BackendError> {
        StorageGateway::update_volume_metadata(self, deadline, volume_id, &patch).await
    }
}
