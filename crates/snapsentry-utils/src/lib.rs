// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Utilities shared between the SnapSentry crates.

use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

pub mod backoff;

/// Load a configuration value from a YAML file located at the provided path.
pub fn load_from_yaml<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "reading configuration from file");

    let reader = std::fs::File::open(path)
        .with_context(|| format!("unable to load configuration from {}", path.display()))?;

    Ok(serde_yaml::from_reader(reader)?)
}
