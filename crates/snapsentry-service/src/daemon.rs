// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Daemon mode: run the creation and expiry workflows on independent periodic schedules.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    task::JoinSet,
    time::{interval, MissedTickBehavior},
};

use crate::{
    backend::SnapshotBackend,
    notifications::Webhook,
    workflow::{self, create, expire},
};

/// The periodic schedules the daemon runs on.
#[derive(Debug, Clone, Copy)]
pub struct DaemonSchedule {
    /// Interval between creation runs.
    pub create_every: Duration,
    /// Interval between expiry runs.
    pub expire_every: Duration,
}

/// Runs both workflows until interrupted.
///
/// Each workflow runs on its own ticker with delayed missed-tick behaviour, so a run that takes
/// longer than its interval postpones the next tick instead of piling up overlapping runs. The
/// daemon stops cleanly on ctrl-c; a run already in progress is aborted with the tasks.
pub async fn run_daemon<B: SnapshotBackend + 'static>(
    backend: Arc<B>,
    webhook: Option<Arc<Webhook>>,
    timeout_seconds: u64,
    schedule: DaemonSchedule,
) -> anyhow::Result<()> {
    tracing::info!(
        create_every = ?schedule.create_every,
        expire_every = ?schedule.expire_every,
        "daemon started"
    );

    let mut tasks: JoinSet<()> = JoinSet::new();

    let create_backend = backend.clone();
    let create_webhook = webhook.clone();
    tasks.spawn(async move {
        let mut ticker = interval(schedule.create_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately; consume it so the initial run
        // happens one full period after startup, like every later run.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let deadline = workflow::deadline_for(timeout_seconds);
            match create::run_creation_workflow(
                create_backend.clone(),
                create_webhook.clone(),
                deadline,
            )
            .await
            {
                Ok(summary) => tracing::info!(
                    success_count = summary.success_count,
                    error_count = summary.error_count,
                    "scheduled creation run completed"
                ),
                Err(error) => tracing::error!(%error, "scheduled creation run failed"),
            }
        }
    });

    let expire_backend = backend.clone();
    tasks.spawn(async move {
        let mut ticker = interval(schedule.expire_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let deadline = workflow::deadline_for(timeout_seconds);
            match expire::run_expiry_workflow(expire_backend.as_ref(), Utc::now(), deadline).await {
                Ok(summary) => tracing::info!(
                    deleted = summary.deleted,
                    failed = summary.failed,
                    "scheduled expiry run completed"
                ),
                Err(error) => tracing::error!(%error, "scheduled expiry run failed"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::warn!("shutting down daemon on interrupt signal");
    tasks.shutdown().await;
    Ok(())
}
