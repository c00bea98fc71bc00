// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Workflows and service plumbing for SnapSentry.
//!
//! The [`workflow`] module holds the two metadata-driven workflows: creation, which evaluates
//! every subscribed volume's schedules and takes due snapshots, and expiry, which sweeps managed
//! snapshots past their recorded expiry. Both run against the [`backend`] trait seam so they can
//! be exercised without a cloud. The remaining modules provide the daemon loop, the failure
//! webhook, tracing setup, and the CLI argument tree.

pub mod backend;
pub mod cli;
pub mod daemon;
pub mod notifications;
pub mod telemetry;
pub mod workflow;
