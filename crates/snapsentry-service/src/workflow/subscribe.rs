// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The subscription workflow: attach or update a snapshot policy on a volume.
//!
//! Subscribing validates the policy locally, then writes its tags onto the volume through the
//! read-merge-write metadata update, so tags owned by other systems survive.

use snapsentry_client::BackendError;
use snapsentry_core::{PolicyError, SnapshotPolicy};
use tokio::time::Instant;

use crate::backend::SnapshotBackend;

/// Error raised by the subscription workflow.
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    /// The policy configuration did not validate; nothing was written.
    #[error("invalid policy configuration: {0}")]
    InvalidPolicy(#[from] PolicyError),
    /// The metadata update failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Normalizes the policy and applies its tags to the volume.
pub async fn apply_subscription<B, P>(
    backend: &B,
    deadline: Option<Instant>,
    volume_id: &str,
    mut policy: P,
) -> Result<(), SubscribeError>
where
    B: SnapshotBackend + ?Sized,
    P: SnapshotPolicy,
{
    policy.normalize()?;

    tracing::info!(
        volume_id,
        policy_type = %policy.policy_type(),
        retention_days = policy.retention_days(),
        "applying subscription policy to volume"
    );

    let (volume, request_id) = backend
        .update_volume_metadata(deadline, volume_id, policy.to_tags())
        .await?;

    tracing::info!(
        volume_id = %volume.id,
        request_id = request_id.as_deref().unwrap_or(""),
        "subscription applied"
    );
    Ok(())
}
