// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The command-line argument tree for the `snapsentry` binary.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};

/// Policy-driven snapshot lifecycle manager for cloud block storage.
///
/// Snapshot schedules live as metadata tags on the volumes themselves; SnapSentry evaluates them
/// against the current time to create due snapshots and deletes managed snapshots whose
/// retention has expired.
#[derive(Parser, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
#[command(name = "snapsentry", version, author)]
pub struct App {
    /// Name of the cloud profile to use from the profile configuration file.
    #[clap(long, global = true, default_value = "")]
    pub cloud: String,

    /// Path to the cloud profile configuration file.
    #[clap(long, global = true, default_value = "clouds.yaml")]
    pub config: PathBuf,

    /// Global execution timeout in seconds (0 = run unbounded).
    #[clap(long, global = true, default_value_t = 0)]
    pub timeout: u64,

    /// Logging level: debug, info, warn, or error.
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Webhook URL for failure alerting.
    #[clap(long, global = true)]
    pub webhook_url: Option<String>,

    /// Webhook username for HTTP basic authentication.
    #[clap(long, global = true)]
    pub webhook_username: Option<String>,

    /// Webhook password for HTTP basic authentication.
    #[clap(long, global = true)]
    pub webhook_password: Option<String>,

    /// The command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// The top-level commands.
#[derive(Subcommand, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
pub enum Commands {
    /// Evaluate every subscribed volume's schedules and create due snapshots.
    CreateSnapshots,

    /// Delete managed snapshots whose recorded expiry has passed.
    ExpireSnapshots,

    /// Configure snapshot policies on a volume.
    #[command(subcommand)]
    Subscribe(SubscribeCommands),

    /// Run both workflows continuously on periodic schedules.
    Daemon {
        /// Interval between creation runs, e.g. "10m" or "1h30m".
        #[clap(long, default_value = "10m", value_parser = humantime::parse_duration)]
        create_every: Duration,
        /// Interval between expiry runs.
        #[clap(long, default_value = "6h", value_parser = humantime::parse_duration)]
        expire_every: Duration,
    },
}

/// Subscription sub-commands, one per schedule kind.
#[derive(Subcommand, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
pub enum SubscribeCommands {
    /// Apply a daily snapshot schedule.
    Daily {
        #[clap(flatten)]
        common: SubscribeCommonArgs,
        /// Snapshot trigger time in HH:MM format.
        #[clap(long)]
        start_time: String,
    },
    /// Apply a weekly snapshot schedule.
    Weekly {
        #[clap(flatten)]
        common: SubscribeCommonArgs,
        /// Snapshot trigger time in HH:MM format.
        #[clap(long)]
        start_time: String,
        /// Day of the week (e.g. "Monday", "mon", or 0-6 with Sunday as 0).
        #[clap(long, default_value = "Sunday")]
        week_day: String,
    },
    /// Apply a monthly snapshot schedule.
    Monthly {
        #[clap(flatten)]
        common: SubscribeCommonArgs,
        /// Snapshot trigger time in HH:MM format.
        #[clap(long)]
        start_time: String,
        /// Day of the month (1-31); clamped to the last day of shorter months.
        #[clap(long, default_value_t = 1)]
        month_day: i64,
    },
    /// Apply an express (high-frequency) snapshot schedule.
    Express {
        #[clap(flatten)]
        common: SubscribeCommonArgs,
        /// Hours between snapshot buckets; one of 6, 8, or 12.
        #[clap(long, default_value_t = 6)]
        interval_hours: i64,
    },
}

/// Flags shared by every subscription sub-command.
#[derive(clap::Args, Debug, Clone)]
pub struct SubscribeCommonArgs {
    /// Id of the volume to subscribe.
    #[clap(long)]
    pub volume_id: String,
    /// Enable or disable this specific policy.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub enabled: bool,
    /// Retention period in days.
    #[clap(long)]
    pub retention: i64,
    /// IANA timezone name (e.g. "UTC", "Europe/Paris").
    #[clap(long, default_value = "")]
    pub timezone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_creation_command() {
        let app = App::try_parse_from([
            "snapsentry",
            "--cloud",
            "production",
            "--timeout",
            "120",
            "create-snapshots",
        ])
        .unwrap();

        assert_eq!(app.cloud, "production");
        assert_eq!(app.timeout, 120);
        assert!(matches!(app.command, Commands::CreateSnapshots));
    }

    #[test]
    fn parses_a_weekly_subscription() {
        let app = App::try_parse_from([
            "snapsentry",
            "--cloud",
            "production",
            "subscribe",
            "weekly",
            "--volume-id",
            "vol-1",
            "--retention",
            "14",
            "--start-time",
            "14:00",
            "--week-day",
            "Monday",
        ])
        .unwrap();

        match app.command {
            Commands::Subscribe(SubscribeCommands::Weekly {
                common,
                start_time,
                week_day,
            }) => {
                assert_eq!(common.volume_id, "vol-1");
                assert_eq!(common.retention, 14);
                assert!(common.enabled);
                assert_eq!(start_time, "14:00");
                assert_eq!(week_day, "Monday");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_daemon_intervals() {
        let app = App::try_parse_from([
            "snapsentry",
            "--cloud",
            "production",
            "daemon",
            "--create-every",
            "5m",
            "--expire-every",
            "12h",
        ])
        .unwrap();

        match app.command {
            Commands::Daemon {
                create_every,
                expire_every,
            } => {
                assert_eq!(create_every, Duration::from_secs(300));
                assert_eq!(expire_every, Duration::from_secs(12 * 3600));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn missing_required_subscription_flags_fail() {
        let result = App::try_parse_from([
            "snapsentry",
            "--cloud",
            "production",
            "subscribe",
            "daily",
            "--volume-id",
            "vol-1",
        ]);
        assert!(result.is_err());
    }
}
