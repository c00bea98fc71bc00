// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The SnapSentry command-line binary.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use snapsentry_client::{load_profile, RetryConfig, StorageGateway};
use snapsentry_core::{DailyPolicy, ExpressPolicy, MonthlyPolicy, WeeklyPolicy};
use snapsentry_service::{
    cli::{App, Commands, SubscribeCommands},
    daemon::{self, DaemonSchedule},
    notifications::Webhook,
    telemetry,
    workflow::{self, apply_subscription, run_creation_workflow, run_expiry_workflow},
};

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    telemetry::init_tracing(&app.log_level)?;

    if app.cloud.is_empty() {
        bail!("required flag \"--cloud\" not set");
    }

    let profile = load_profile(&app.config, &app.cloud)
        .with_context(|| format!("loading cloud profile '{}'", app.cloud))?;

    let webhook = app
        .webhook_url
        .clone()
        .map(|url| Arc::new(Webhook::new(url, app.webhook_username.clone(), app.webhook_password.clone())));

    match app.command {
        Commands::CreateSnapshots => {
            let gateway = StorageGateway::connect(&profile, RetryConfig::default())
                .await
                .context("client initialization failed")?;
            let summary = run_creation_workflow(
                Arc::new(gateway),
                webhook,
                workflow::deadline_for(app.timeout),
            )
            .await?;
            tracing::info!(
                volumes_processed = summary.volumes_processed,
                success_count = summary.success_count,
                error_count = summary.error_count,
                "creation workflow finished"
            );
        }
        Commands::ExpireSnapshots => {
            let gateway = StorageGateway::connect(&profile, RetryConfig::default())
                .await
                .context("client initialization failed")?;
            let summary = run_expiry_workflow(
                &gateway,
                Utc::now(),
                workflow::deadline_for(app.timeout),
            )
            .await?;
            tracing::info!(
                deleted = summary.deleted,
                retained = summary.retained,
                skipped = summary.skipped,
                failed = summary.failed,
                "expiry workflow finished"
            );
        }
        Commands::Subscribe(subscription) => {
            let gateway = StorageGateway::connect(&profile, RetryConfig::interactive())
                .await
                .context("client initialization failed")?;
            let deadline = workflow::deadline_for(app.timeout);
            match subscription {
                SubscribeCommands::Daily { common, start_time } => {
                    let policy =
                        DailyPolicy::new(common.enabled, common.retention, start_time, common.timezone);
                    apply_subscription(&gateway, deadline, &common.volume_id, policy).await?;
                }
                SubscribeCommands::Weekly {
                    common,
                    start_time,
                    week_day,
                } => {
                    let policy = WeeklyPolicy::new(
                        common.enabled,
                        common.retention,
                        start_time,
                        common.timezone,
                        week_day,
                    );
                    apply_subscription(&gateway, deadline, &common.volume_id, policy).await?;
                }
                SubscribeCommands::Monthly {
                    common,
                    start_time,
                    month_day,
                } => {
                    let policy = MonthlyPolicy::new(
                        common.enabled,
                        common.retention,
                        start_time,
                        common.timezone,
                        month_day,
                    );
                    apply_subscription(&gateway, deadline, &common.volume_id, policy).await?;
                }
                SubscribeCommands::Express {
                    common,
                    interval_hours,
                } => {
                    let policy = ExpressPolicy::new(
                        common.enabled,
                        common.retention,
                        common.timezone,
                        interval_hours,
                    );
                    apply_subscription(&gateway, deadline, &common.volume_id, policy).await?;
                }
            }
        }
        Commands::Daemon {
            create_every,
            expire_every,
        } => {
            let gateway = StorageGateway::connect(&profile, RetryConfig::default())
                .await
                .context("client initialization failed")?;
            daemon::run_daemon(
                Arc::new(gateway),
                webhook,
                app.timeout,
                DaemonSchedule {
                    create_every,
                    expire_every,
                },
            )
            .await?;
        }
    }

    Ok(())
}
