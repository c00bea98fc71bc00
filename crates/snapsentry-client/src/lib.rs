// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Client for the block-storage REST API.
//!
//! The [`StorageGateway`] authenticates against the cloud's identity service using a named
//! profile from a `clouds.yaml`-style file, resolves the block-storage endpoint from the service
//! catalog, and exposes the volume and snapshot operations the workflows need. Every call is
//! wrapped by the [`retry`] executor, which classifies failures, backs off exponentially with
//! jitter, and honours both a per-operation timeout and an optional caller deadline.

pub mod api;
pub mod config;
pub mod error;
pub mod retry;

mod client;

pub use client::StorageGateway;
pub use config::{load_profile, CloudProfile, ProfileError};
pub use error::{BackendError, CreateSnapshotError};
pub use retry::RetryConfig;
