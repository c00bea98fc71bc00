// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cloud profile configuration.
//!
//! Profiles live in a `clouds.yaml`-style file: a `clouds:` map keyed by profile name, each entry
//! holding the identity endpoint, credentials, and endpoint-selection preferences.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

/// Error raised while loading a cloud profile.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// The configuration file could not be read or parsed.
    #[error("failed to read cloud configuration: {0}")]
    Load(#[source] anyhow::Error),
    /// The requested profile is not present in the file.
    #[error("cloud profile '{profile}' not found in '{path}'")]
    UnknownProfile {
        /// The profile that was requested.
        profile: String,
        /// The file that was searched.
        path: PathBuf,
    },
}

/// The top-level shape of the profile configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfigFile {
    /// Profiles keyed by name.
    pub clouds: HashMap<String, CloudProfile>,
}

/// A single cloud profile.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudProfile {
    /// Identity endpoint and credentials.
    pub auth: AuthConfig,
    /// Restrict catalog endpoints to this region; unset means any region.
    #[serde(default)]
    pub region_name: Option<String>,
    /// Catalog endpoint interface to use: "public", "internal", or "admin".
    #[serde(default = "default_interface")]
    pub interface: String,
}

/// Password-based identity credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity service, e.g. `https://keystone.example.com/v3`.
    pub auth_url: String,
    /// User name to authenticate as.
    pub username: String,
    /// Password for the user.
    pub password: String,
    /// Project to scope the token to; unscoped when unset.
    #[serde(default)]
    pub project_name: Option<String>,
    /// Domain the user belongs to.
    #[serde(default = "default_domain")]
    pub user_domain_name: String,
    /// Domain the project belongs to.
    #[serde(default = "default_domain")]
    pub project_domain_name: String,
}

fn default_interface() -> String {
    "public".to_string()
}

fn default_domain() -> String {
    "Default".to_string()
}

/// Loads the named profile from the configuration file at `path`.
pub fn load_profile(path: &Path, profile: &str) -> Result<CloudProfile, ProfileError> {
    let file: CloudConfigFile =
        snapsentry_utils::load_from_yaml(path).map_err(ProfileError::Load)?;
    file.clouds
        .get(profile)
        .cloned()
        .ok_or_else(|| ProfileError::UnknownProfile {
            profile: profile.to_string(),
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = "\
clouds:
  production:
    auth:
      auth_url: https://keystone.example.com/v3
      username: backup-operator
      password: hunter2
      project_name: backups
    region_name: eu-west-1
  minimal:
    auth:
      auth_url: https://keystone.example.com/v3
      username: dev
      password: dev
";

    fn write_sample() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file is created");
        write!(file, "{SAMPLE}").expect("write succeeds");
        file
    }

    #[test]
    fn loads_a_fully_specified_profile() {
        let file = write_sample();
        let profile = load_profile(file.path(), "production").unwrap();

        assert_eq!(profile.auth.username, "backup-operator");
        assert_eq!(profile.auth.project_name.as_deref(), Some("backups"));
        assert_eq!(profile.region_name.as_deref(), Some("eu-west-1"));
        assert_eq!(profile.interface, "public");
    }

    #[test]
    fn fills_defaults_for_a_minimal_profile() {
        let file = write_sample();
        let profile = load_profile(file.path(), "minimal").unwrap();

        assert_eq!(profile.auth.user_domain_name, "Default");
        assert_eq!(profile.auth.project_domain_name, "Default");
        assert!(profile.region_name.is_none());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let file = write_sample();
        let result = load_profile(file.path(), "staging");
        assert!(matches!(
            result,
            Err(ProfileError::UnknownProfile { profile, .. }) if profile == "staging"
        ));
    }
}
