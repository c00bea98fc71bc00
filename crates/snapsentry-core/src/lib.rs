// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core policy engine for SnapSentry.
//!
//! Backup intent is stored entirely as metadata key/value tags on volumes; this crate owns the
//! vocabulary of those tags and the pure scheduling logic built on top of them:
//!
//! - the [`metadata`] codec between flat string maps and typed records,
//! - the four schedule kinds in [`policy`] (express, daily, weekly, monthly), and
//! - the half-open window evaluation that yields an idempotent take/skip decision.
//!
//! Everything in this crate is free of I/O; time always enters through an explicit reference
//! instant so that decisions are deterministic and testable.

pub mod metadata;
pub mod policy;
pub mod types;
pub(crate) mod window;

pub use metadata::{parse_tags, MetadataError, SnapshotMetadata};
pub use policy::{
    policy_from_tags, DailyPolicy, ExpressPolicy, MonthlyPolicy, PolicyError, SnapshotPolicy,
    WeeklyPolicy,
};
pub use types::{
    EvaluationResult, PolicyType, PolicyWindow, SnapshotInfo, VolumeAttachment, VolumeInfo,
    MANAGED_TAG,
};
