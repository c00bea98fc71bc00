// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The creation workflow: discover subscribed volumes, evaluate their policies, and take due
//! snapshots.
//!
//! Volumes attached to the same virtual machine are processed in one concurrent burst to keep
//! the time skew between their snapshots small; multi-attached and unattached volumes are
//! processed one at a time. The workflow never aborts on a single volume's failure: errors are
//! counted, reported through logs and the optional webhook, and the sweep continues.

use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use snapsentry_client::BackendError;
use snapsentry_core::{policy_from_tags, PolicyType, VolumeInfo};
use tokio::{task::JoinSet, time::Instant};
use uuid::Uuid;

use super::{snapshot_name, RunSummary, VolumeProcessingError};
use crate::{
    backend::SnapshotBackend,
    notifications::{SnapshotCreationFailure, Webhook},
};

/// Volumes grouped by their VM attachment, which dictates the processing strategy.
#[derive(Debug, Default)]
pub struct VolumeGroups {
    /// Volumes with exactly one attachment, keyed by server id.
    pub attached: HashMap<String, Vec<VolumeInfo>>,
    /// Volumes attached to two or more servers; processed sequentially for safety against
    /// shared-writer races.
    pub multi_attached: Vec<VolumeInfo>,
    /// Volumes with no attachment; processed sequentially.
    pub unattached: Vec<VolumeInfo>,
}

/// Splits the discovered volumes into the three attachment groups.
pub fn group_by_attachment(volumes: Vec<VolumeInfo>) -> VolumeGroups {
    let mut groups = VolumeGroups::default();
    for volume in volumes {
        match volume.attachments.len() {
            0 => groups.unattached.push(volume),
            1 => {
                let server_id = volume.attachments[0].server_id.clone();
                groups.attached.entry(server_id).or_default().push(volume);
            }
            _ => groups.multi_attached.push(volume),
        }
    }
    groups
}

/// Runs the end-to-end creation workflow.
///
/// The deadline, when set, stops the *scheduling* of new volume workers; workers already in
/// flight observe it at their next backend call and finish on their own.
pub async fn run_creation_workflow<B: SnapshotBackend + 'static>(
    backend: Arc<B>,
    webhook: Option<Arc<Webhook>>,
    deadline: Option<Instant>,
) -> Result<RunSummary, BackendError> {
    let run_id = Uuid::new_v4();
    tracing::info!(run_id = %run_id, "initializing snapshot creation workflow");

    let volumes = backend.list_subscribed_volumes(deadline).await?;
    tracing::info!(run_id = %run_id, volume_count = volumes.len(), "subscribed volume discovery completed");

    let mut summary = RunSummary {
        volumes_processed: volumes.len(),
        ..Default::default()
    };
    let groups = group_by_attachment(volumes);

    tracing::debug!(vm_count = groups.attached.len(), "processing single-attached volumes");
    for (server_id, group) in groups.attached {
        tracing::debug!(vm_id = %server_id, volume_count = group.len(), "processing volumes attached to a VM");
        let (successes, failures) =
            process_volume_group(backend.clone(), webhook.clone(), group, deadline).await;
        summary.success_count += successes;
        summary.error_count += failures;
    }

    tracing::debug!(count = groups.multi_attached.len(), "processing multi-attached volumes");
    for volume in groups.multi_attached {
        let (successes, failures) =
            process_volume_group(backend.clone(), webhook.clone(), vec![volume], deadline).await;
        summary.success_count += successes;
        summary.error_count += failures;
    }

    tracing::debug!(count = groups.unattached.len(), "processing unattached volumes");
    for volume in groups.unattached {
        let (successes, failures) =
            process_volume_group(backend.clone(), webhook.clone(), vec![volume], deadline).await;
        summary.success_count += successes;
        summary.error_count += failures;
    }

    tracing::info!(
        run_id = %run_id,
        volumes_processed = summary.volumes_processed,
        success_count = summary.success_count,
        error_count = summary.error_count,
        "creation workflow summary"
    );
    Ok(summary)
}

/// Processes one group of volumes concurrently: one worker per volume, all started before the
/// join barrier, so snapshots of a VM's disks start near-simultaneously.
async fn process_volume_group<B: SnapshotBackend + 'static>(
    backend: Arc<B>,
    webhook: Option<Arc<Webhook>>,
    volumes: Vec<VolumeInfo>,
    deadline: Option<Instant>,
) -> (u32, u32) {
    let mut workers = JoinSet::new();

    for volume in volumes {
        // The deadline halts the start of new work only; started workers run to completion.
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::error!("workflow deadline reached; not starting further volume workers");
            break;
        }

        let backend = backend.clone();
        let webhook = webhook.clone();
        workers.spawn(async move {
            tracing::debug!(volume_id = %volume.id, volume_name = %volume.name, "starting volume processing");
            match process_volume(backend.as_ref(), webhook.as_deref(), &volume, deadline).await {
                Ok(()) => {
                    tracing::debug!(volume_id = %volume.id, "volume processing completed");
                    true
                }
                Err(error) => {
                    tracing::error!(volume_id = %volume.id, %error, "volume processing encountered errors");
                    false
                }
            }
        });
    }

    let mut successes = 0;
    let mut failures = 0;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(true) => successes += 1,
            Ok(false) => failures += 1,
            Err(join_error) => {
                tracing::error!(%join_error, "volume worker did not complete");
                failures += 1;
            }
        }
    }
    (successes, failures)
}

/// Applies every policy kind, in fixed order, to a single volume.
async fn process_volume<B: SnapshotBackend + ?Sized>(
    backend: &B,
    webhook: Option<&Webhook>,
    volume: &VolumeInfo,
    deadline: Option<Instant>,
) -> Result<(), VolumeProcessingError> {
    let mut errors = Vec::new();

    for kind in PolicyType::EVALUATION_ORDER {
        let mut policy = match policy_from_tags(kind, &volume.metadata) {
            Ok(policy) => policy,
            Err(error) => {
                tracing::debug!(volume_id = %volume.id, policy_type = %kind, %error, "policy tags did not parse; treating the policy as unconfigured");
                continue;
            }
        };

        if !policy.is_enabled() {
            tracing::debug!(volume_id = %volume.id, policy_type = %kind, "policy is disabled");
            continue;
        }

        if let Err(error) = policy.normalize() {
            tracing::debug!(volume_id = %volume.id, policy_type = %kind, %error, "policy configuration is invalid");
            errors.push(format!("{kind} policy configuration is invalid: {error}"));
            continue;
        }

        let last_snapshot = match backend
            .latest_policy_snapshot(deadline, &volume.id, kind)
            .await
        {
            Ok(last_snapshot) => last_snapshot,
            Err(error) => {
                tracing::error!(volume_id = %volume.id, policy_type = %kind, %error, "snapshot history retrieval failed");
                errors.push(format!(
                    "{kind} policy snapshot history retrieval failed: {error}"
                ));
                continue;
            }
        };

        let result = policy.evaluate(Utc::now(), last_snapshot.as_ref());
        if !result.should_snapshot {
            tracing::info!(
                volume_id = %volume.id,
                policy_type = %kind,
                reason = %result.reason,
                "snapshot creation skipped"
            );
            continue;
        }
        let (Some(window), Some(metadata)) = (result.window, result.metadata) else {
            continue;
        };

        tracing::info!(
            volume_id = %volume.id,
            policy_type = %kind,
            window_start = %window.start,
            window_end = %window.end,
            "snapshot window active; initiating creation"
        );

        let name = snapshot_name(kind, &volume.id, window.start);
        let tags = metadata.to_tags(window.start.timezone());

        match backend
            .create_snapshot(deadline, &volume.id, &name, tags)
            .await
        {
            Ok((snapshot, request_id)) => {
                tracing::info!(
                    volume_id = %volume.id,
                    policy_type = %kind,
                    snapshot_id = %snapshot.id,
                    request_id = request_id.as_deref().unwrap_or(""),
                    "snapshot resource created"
                );
            }
            Err(create_error) => {
                tracing::error!(
                    volume_id = %volume.id,
                    policy_type = %kind,
                    error = %create_error,
                    request_id = create_error.request_id.as_deref().unwrap_or(""),
                    "snapshot resource creation failed"
                );
                errors.push(format!("{kind} policy snapshot creation failed: {create_error}"));

                if let Some(webhook) = webhook {
                    let alert = SnapshotCreationFailure {
                        service: "snapsentry",
                        virtual_machine_name: String::new(),
                        virtual_machine_id: volume
                            .attachments
                            .first()
                            .map(|attachment| attachment.server_id.clone())
                            .unwrap_or_default(),
                        volume_id: volume.id.clone(),
                        snapshot_id: create_error.snapshot_id.clone().unwrap_or_default(),
                        message: format!("volume processing encountered an error: {create_error}"),
                        snapshot_window: Some(window),
                    };
                    // Notification failures are logged only; they never affect the snapshot
                    // outcome and are not joined into the volume's error.
                    if let Err(notify_error) = webhook.notify(&alert).await {
                        tracing::warn!(%notify_error, "failure notification could not be delivered");
                    }
                }

                // A failed create may still have produced a resource; reclaim it.
                if let Some(orphan_id) = &create_error.snapshot_id {
                    tracing::debug!(
                        volume_id = %volume.id,
                        snapshot_id = %orphan_id,
                        "orphaned resource detected; initiating cleanup"
                    );
                    match backend.delete_snapshot(deadline, orphan_id).await {
                        Ok(request_id) => {
                            tracing::info!(
                                snapshot_id = %orphan_id,
                                cleanup_request_id = request_id.as_deref().unwrap_or(""),
                                "orphaned snapshot cleaned up"
                            );
                        }
                        Err(cleanup_error) => {
                            tracing::error!(
                                snapshot_id = %orphan_id,
                                %cleanup_error,
                                "orphaned snapshot cleanup failed; manual intervention required"
                            );
                            errors.push(format!(
                                "{kind} policy orphaned snapshot cleanup failed; manual intervention required: {cleanup_error}"
                            ));
                        }
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(VolumeProcessingError { errors })
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use snapsentry_core::{SnapshotInfo, VolumeAttachment};

    use super::*;
    use crate::backend::MockSnapshotBackend;

    fn volume(id: &str, attachments: &[&str], metadata: &[(&str, &str)]) -> VolumeInfo {
        VolumeInfo {
            id: id.to_string(),
            name: format!("{id}-name"),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            attachments: attachments
                .iter()
                .map(|server_id| VolumeAttachment {
                    server_id: server_id.to_string(),
                })
                .collect(),
        }
    }

    /// Tags enabling a daily policy that triggers at midnight UTC, so the window is always open
    /// and a volume without history always takes.
    fn always_open_daily_tags() -> Vec<(&'static str, &'static str)> {
        vec![
            ("x-snapsentry-daily-enabled", "true"),
            ("x-snapsentry-daily-retention-days", "2"),
        ]
    }

    fn available_snapshot(id: &str, volume_id: &str) -> SnapshotInfo {
        SnapshotInfo {
            id: id.to_string(),
            volume_id: volume_id.to_string(),
            status: "available".to_string(),
            created_at: Utc::now(),
            ..Default::default()
        }
    }

    mod grouping {
        use super::*;

        #[test]
        fn splits_volumes_by_attachment_count() {
            let groups = group_by_attachment(vec![
                volume("vol-a", &["vm-1"], &[]),
                volume("vol-b", &["vm-1"], &[]),
                volume("vol-c", &["vm-2"], &[]),
                volume("vol-d", &["vm-1", "vm-2"], &[]),
                volume("vol-e", &[], &[]),
            ]);

            assert_eq!(groups.attached.len(), 2);
            assert_eq!(groups.attached["vm-1"].len(), 2);
            assert_eq!(groups.attached["vm-2"].len(), 1);
            assert_eq!(groups.multi_attached.len(), 1);
            assert_eq!(groups.multi_attached[0].id, "vol-d");
            assert_eq!(groups.unattached.len(), 1);
            assert_eq!(groups.unattached[0].id, "vol-e");
        }

        #[test]
        fn empty_input_produces_empty_groups() {
            let groups = group_by_attachment(Vec::new());
            assert!(groups.attached.is_empty());
            assert!(groups.multi_attached.is_empty());
            assert!(groups.unattached.is_empty());
        }
    }

    mod workflow {
        use super::*;

        #[tokio::test]
        async fn creates_a_snapshot_for_a_due_policy() {
            let mut backend = MockSnapshotBackend::new();
            backend
                .expect_list_subscribed_volumes()
                .returning(|_| Ok(vec![volume("vol-1", &["vm-1"], &always_open_daily_tags())]));
            backend
                .expect_latest_policy_snapshot()
                .with(mockall::predicate::always(), eq("vol-1"), eq(PolicyType::Daily))
                .times(1)
                .returning(|_, _, _| Ok(None));
            backend
                .expect_create_snapshot()
                .withf(|_, volume_id, name, tags| {
                    volume_id == "vol-1"
                        && name.starts_with("managed-daily-vol-1-")
                        && tags["x-snapsentry-snapshot-managed"] == "true"
                        && tags["x-snapsentry-snapshot-policy-type"] == "daily"
                })
                .times(1)
                .returning(|_, volume_id, _, _| {
                    Ok((available_snapshot("snap-new", volume_id), None))
                });

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.volumes_processed, 1);
            assert_eq!(summary.success_count, 1);
            assert_eq!(summary.error_count, 0);
        }

        #[tokio::test]
        async fn covered_window_skips_creation() {
            let mut backend = MockSnapshotBackend::new();
            backend
                .expect_list_subscribed_volumes()
                .returning(|_| Ok(vec![volume("vol-1", &["vm-1"], &always_open_daily_tags())]));
            // A snapshot created "now" necessarily lies in the currently open window.
            backend
                .expect_latest_policy_snapshot()
                .returning(|_, volume_id, _| {
                    Ok(Some(available_snapshot("snap-prior", volume_id)))
                });
            backend.expect_create_snapshot().times(0);

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.success_count, 1);
            assert_eq!(summary.error_count, 0);
        }

        #[tokio::test]
        async fn failed_create_cleans_up_the_orphan_and_counts_an_error() {
            let mut backend = MockSnapshotBackend::new();
            backend
                .expect_list_subscribed_volumes()
                .returning(|_| Ok(vec![volume("vol-1", &["vm-1"], &always_open_daily_tags())]));
            backend
                .expect_latest_policy_snapshot()
                .returning(|_, _, _| Ok(None));
            backend.expect_create_snapshot().times(1).returning(|_, _, _, _| {
                Err(snapsentry_client::CreateSnapshotError {
                    snapshot_id: Some("snap-orphan".to_string()),
                    request_id: None,
                    source: BackendError::SnapshotFailedState {
                        id: "snap-orphan".to_string(),
                        status: "error".to_string(),
                    },
                })
            });
            backend
                .expect_delete_snapshot()
                .with(mockall::predicate::always(), eq("snap-orphan"))
                .times(1)
                .returning(|_, _| Ok(None));

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.success_count, 0);
            assert_eq!(summary.error_count, 1);
        }

        #[tokio::test]
        async fn failed_create_without_an_id_skips_cleanup() {
            let mut backend = MockSnapshotBackend::new();
            backend
                .expect_list_subscribed_volumes()
                .returning(|_| Ok(vec![volume("vol-1", &[], &always_open_daily_tags())]));
            backend
                .expect_latest_policy_snapshot()
                .returning(|_, _, _| Ok(None));
            backend.expect_create_snapshot().times(1).returning(|_, _, _, _| {
                Err(snapsentry_client::CreateSnapshotError {
                    snapshot_id: None,
                    request_id: None,
                    source: BackendError::TimedOutBeforeAttempt {
                        operation: "create_snapshot",
                        attempt: 1,
                    },
                })
            });
            backend.expect_delete_snapshot().times(0);

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.error_count, 1);
        }

        #[tokio::test]
        async fn volumes_without_policy_tags_succeed_without_backend_calls() {
            let mut backend = MockSnapshotBackend::new();
            backend
                .expect_list_subscribed_volumes()
                .returning(|_| Ok(vec![volume("vol-bare", &[], &[])]));
            backend.expect_latest_policy_snapshot().times(0);
            backend.expect_create_snapshot().times(0);

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.success_count, 1);
            assert_eq!(summary.error_count, 0);
        }

        #[tokio::test]
        async fn invalid_policy_configuration_counts_as_a_volume_error() {
            let mut backend = MockSnapshotBackend::new();
            backend.expect_list_subscribed_volumes().returning(|_| {
                Ok(vec![volume(
                    "vol-1",
                    &[],
                    &[
                        ("x-snapsentry-daily-enabled", "true"),
                        ("x-snapsentry-daily-timezone", "Mars/Phobos"),
                    ],
                )])
            });
            backend.expect_latest_policy_snapshot().times(0);

            let summary = run_creation_workflow(Arc::new(backend), None, None)
                .await
                .unwrap();

            assert_eq!(summary.error_count, 1);
        }

        #[tokio::test]
        async fn expired_deadline_stops_scheduling_workers() {
            let mut backend = MockSnapshotBackend::new();
            backend.expect_list_subscribed_volumes().returning(|_| {
                Ok(vec![
                    volume("vol-1", &[], &always_open_daily_tags()),
                    volume("vol-2", &[], &always_open_daily_tags()),
                ])
            });
            backend.expect_latest_policy_snapshot().times(0);
            backend.expect_create_snapshot().times(0);

            // A deadline captured in the past by the time workers would start.
            let expired = Instant::now();
            let summary = run_creation_workflow(Arc::new(backend), None, Some(expired))
                .await
                .unwrap();

            // Discovery succeeded but no workers started.
            assert_eq!(summary.volumes_processed, 2);
            assert_eq!(summary.success_count, 0);
            assert_eq!(summary.error_count, 0);
        }

        #[tokio::test]
        async fn discovery_failure_aborts_the_workflow() {
            let mut backend = MockSnapshotBackend::new();
            backend.expect_list_subscribed_volumes().returning(|_| {
                Err(BackendError::TimedOutBeforeAttempt {
                    operation: "list_subscribed_volumes",
                    attempt: 1,
                })
            });

            let result = run_creation_workflow(Arc::new(backend), None, None).await;
            assert!(result.is_err());
        }
    }
}
