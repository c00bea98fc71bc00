// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! The typed gateway to the block-storage service.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use reqwest::{RequestBuilder, Response};
use snapsentry_core::{
    metadata, PolicyType, SnapshotInfo, SnapshotMetadata, VolumeInfo, MANAGED_TAG,
};
use tokio::time::Instant;

use crate::{
    api::{
        CatalogEntry, Link, SnapshotListResponse, SnapshotResource, SnapshotResponse,
        TokenResponse, VolumeListResponse, VolumeResponse,
    },
    config::CloudProfile,
    error::{BackendError, CreateSnapshotError},
    retry::{self, RetryConfig},
};

/// Header carrying the issued token on the auth response.
const SUBJECT_TOKEN_HEADER: &str = "x-subject-token";
/// Header carrying the token on every authenticated request.
const AUTH_TOKEN_HEADER: &str = "x-auth-token";
/// Trace header attached by the backend to every response.
const REQUEST_ID_HEADER: &str = "x-openstack-request-id";

/// Service types under which deployments list their block-storage endpoint.
const BLOCK_STORAGE_SERVICE_TYPES: [&str; 3] = ["volumev3", "block-storage", "volume"];

/// Description stamped on every snapshot this system creates.
const SNAPSHOT_DESCRIPTION: &str = "Created and managed by SnapSentry";

/// How often the create call polls for the snapshot to become available.
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum number of response-body characters preserved in error messages.
const ERROR_BODY_LIMIT: usize = 256;

/// An authenticated connection to the block-storage service.
///
/// The gateway is read-only after construction and can be shared freely across workers. Every
/// operation is wrapped by the retry executor under a named label and accepts an optional caller
/// deadline that bounds the operation together with the configured per-operation timeout.
#[derive(Debug)]
pub struct StorageGateway {
    http: reqwest::Client,
    endpoints: UrlEndpoints,
    token: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone)]
struct UrlEndpoints(String);

impl UrlEndpoints {
    fn volumes_detail(&self) -> String {
        format!("{}/volumes/detail", self.0)
    }

    fn volume(&self, volume_id: &str) -> String {
        format!("{}/volumes/{volume_id}", self.0)
    }

    fn volume_metadata(&self, volume_id: &str) -> String {
        format!("{}/volumes/{volume_id}/metadata", self.0)
    }

    fn snapshots(&self) -> String {
        format!("{}/snapshots", self.0)
    }

    fn snapshots_detail(&self) -> String {
        format!("{}/snapshots/detail", self.0)
    }

    fn snapshot(&self, snapshot_id: &str) -> String {
        format!("{}/snapshots/{snapshot_id}", self.0)
    }

    fn snapshot_action(&self, snapshot_id: &str) -> String {
        format!("{}/snapshots/{snapshot_id}/action", self.0)
    }
}

impl StorageGateway {
    /// Authenticates against the profile's identity service and resolves the block-storage
    /// endpoint from the returned service catalog.
    ///
    /// Transient authentication failures are retried like any other backend call.
    pub async fn connect(
        profile: &CloudProfile,
        retry_config: RetryConfig,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let token_url = format!(
            "{}/auth/tokens",
            profile.auth.auth_url.trim_end_matches('/')
        );
        let payload = auth_payload(profile);

        let (token, endpoint) = {
            let http = &http;
            let token_url = token_url.as_str();
            let payload = &payload;

            retry::execute(&retry_config, None, "authenticate", || async move {
                let response = http.post(token_url).json(payload).send().await?;
                let (response, _) = check_status("authenticate", response).await?;

                let token = response
                    .headers()
                    .get(SUBJECT_TOKEN_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
                    .ok_or(BackendError::MissingToken)?;

                let body: TokenResponse = response.json().await?;
                let endpoint = resolve_block_storage_endpoint(
                    &body.token.catalog,
                    profile.region_name.as_deref(),
                    &profile.interface,
                )
                .ok_or_else(|| BackendError::MissingEndpoint {
                    region: profile.region_name.clone().unwrap_or_default(),
                    interface: profile.interface.clone(),
                })?;

                Ok((token, endpoint))
            })
            .await?
        };

        tracing::debug!(%endpoint, "block-storage endpoint resolved");

        Ok(Self {
            http,
            endpoints: UrlEndpoints(endpoint),
            token,
            retry_config,
        })
    }

    /// Lists every volume bearing the management tag.
    ///
    /// The tag filter is applied server-side and pagination is consumed fully before returning.
    pub async fn list_subscribed_volumes(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<VolumeInfo>, BackendError> {
        const OPERATION: &str = "list_subscribed_volumes";
        let filter = serde_json::json!({ MANAGED_TAG: "true" }).to_string();
        let filter = filter.as_str();

        retry::execute(&self.retry_config, deadline, OPERATION, || async move {
            // Rebuilt on every attempt so a mid-pagination retry cannot duplicate entries.
            let mut volumes = Vec::new();
            let mut next: Option<String> = None;

            loop {
                let request = match &next {
                    None => self
                        .http
                        .get(self.endpoints.volumes_detail())
                        .query(&[("metadata", filter)]),
                    Some(href) => self.http.get(href),
                };
                let (response, _) = self.send(OPERATION, request).await?;
                let page: VolumeListResponse = response.json().await?;

                volumes.extend(page.volumes.into_iter().map(VolumeInfo::from));
                next = next_link(&page.links);
                if next.is_none() {
                    return Ok(volumes);
                }
            }
        })
        .await
    }

    /// Lists every "available" snapshot whose metadata marks it as managed.
    ///
    /// The management flag lives in free-form metadata the server cannot filter on, so the
    /// filtering happens client-side over the full listing.
    pub async fn list_managed_snapshots(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<SnapshotInfo>, BackendError> {
        const OPERATION: &str = "list_managed_snapshots";

        retry::execute(&self.retry_config, deadline, OPERATION, || async move {
            let snapshots = self.fetch_available_snapshots(OPERATION, None).await?;
            Ok(snapshots
                .into_iter()
                .filter(|snapshot| {
                    metadata::parse_tags::<SnapshotMetadata>(&snapshot.metadata)
                        .map(|parsed| parsed.managed)
                        .unwrap_or(false)
                })
                .map(SnapshotInfo::from)
                .collect())
        })
        .await
    }

    /// Lists a volume's "available" snapshots of the given policy kind, newest first.
    ///
    /// With `first_only` the listing stops at the first match, which relies on the backend's
    /// newest-first default ordering and serves the common "most recent snapshot" lookup.
    pub async fn list_managed_volume_snapshots(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        policy_type: PolicyType,
        first_only: bool,
    ) -> Result<Vec<SnapshotInfo>, BackendError> {
        const OPERATION: &str = "list_managed_volume_snapshots";

        retry::execute(&self.retry_config, deadline, OPERATION, || async move {
            let snapshots = self
                .fetch_available_snapshots(OPERATION, Some(volume_id))
                .await?;

            let mut matches = Vec::new();
            for snapshot in snapshots {
                let parsed = metadata::parse_tags::<SnapshotMetadata>(&snapshot.metadata);
                if parsed
                    .map(|meta| meta.policy_type == Some(policy_type))
                    .unwrap_or(false)
                {
                    matches.push(SnapshotInfo::from(snapshot));
                    if first_only {
                        break;
                    }
                }
            }
            Ok(matches)
        })
        .await
    }

    /// Triggers snapshot creation and blocks until the backend reports it "available".
    ///
    /// The creation is forced so attached volumes can be snapshotted. On failure the returned
    /// error carries the best-known snapshot id: the resource may exist even though the call
    /// failed, and callers must delete such orphans.
    pub async fn create_snapshot(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        name: &str,
        snapshot_metadata: HashMap<String, String>,
    ) -> Result<(SnapshotInfo, Option<String>), CreateSnapshotError> {
        const OPERATION: &str = "create_snapshot";

        let created_id = Mutex::new(None::<String>);
        let create_request_id = Mutex::new(None::<String>);
        let body = serde_json::json!({
            "snapshot": {
                "volume_id": volume_id,
                "name": name,
                "description": SNAPSHOT_DESCRIPTION,
                "force": true,
                "metadata": snapshot_metadata,
            }
        });

        let result = {
            let created_id = &created_id;
            let create_request_id = &create_request_id;
            let body = &body;

            retry::execute(&self.retry_config, deadline, OPERATION, || async move {
                let request = self.http.post(self.endpoints.snapshots()).json(body);
                let (response, request_id) = self.send(OPERATION, request).await?;
                *create_request_id.lock().expect("lock is never poisoned") = request_id;

                let envelope: SnapshotResponse = response.json().await?;
                let snapshot_id = envelope.snapshot.id.clone();
                *created_id.lock().expect("lock is never poisoned") = Some(snapshot_id.clone());

                self.wait_for_available(snapshot_id).await
            })
            .await
        };

        let request_id = create_request_id
            .lock()
            .expect("lock is never poisoned")
            .clone();
        match result {
            Ok(snapshot) => Ok((snapshot.into(), request_id)),
            Err(source) => Err(CreateSnapshotError {
                snapshot_id: created_id.lock().expect("lock is never poisoned").clone(),
                request_id,
                source,
            }),
        }
    }

    /// Force-deletes a snapshot.
    ///
    /// Returns once the request is accepted; the backend completes the deletion asynchronously.
    pub async fn delete_snapshot(
        &self,
        deadline: Option<Instant>,
        snapshot_id: &str,
    ) -> Result<Option<String>, BackendError> {
        const OPERATION: &str = "delete_snapshot";
        let body = serde_json::json!({ "os-force_delete": null });
        let body = &body;

        retry::execute(&self.retry_config, deadline, OPERATION, || async move {
            let request = self
                .http
                .post(self.endpoints.snapshot_action(snapshot_id))
                .json(body);
            let (_, request_id) = self.send(OPERATION, request).await?;
            Ok(request_id)
        })
        .await
    }

    /// Merges `patch` into a volume's metadata with a read-merge-write cycle.
    ///
    /// Patch keys overwrite existing keys; everything else is preserved. A blind write would
    /// clobber tags set by unrelated systems sharing the metadata namespace.
    pub async fn update_volume_metadata(
        &self,
        deadline: Option<Instant>,
        volume_id: &str,
        patch: &HashMap<String, String>,
    ) -> Result<(VolumeInfo, Option<String>), BackendError> {
        const OPERATION: &str = "update_volume_metadata";

        retry::execute(&self.retry_config, deadline, OPERATION, || async move {
            let (response, _) = self
                .send(OPERATION, self.http.get(self.endpoints.volume(volume_id)))
                .await?;
            let envelope: VolumeResponse = response.json().await?;

            let mut volume = envelope.volume;
            merge_metadata(&mut volume.metadata, patch);

            let body = serde_json::json!({ "metadata": volume.metadata });
            let request = self
                .http
                .put(self.endpoints.volume_metadata(volume_id))
                .json(&body);
            let (_, request_id) = self.send(OPERATION, request).await?;

            Ok((VolumeInfo::from(volume), request_id))
        })
        .await
    }

    /// Fetches every "available" snapshot, optionally restricted to one volume, consuming all
    /// pages. Callers invoke this inside their retried closure, so a retry starts over from an
    /// empty listing.
    async fn fetch_available_snapshots(
        &self,
        operation: &'static str,
        volume_id: Option<&str>,
    ) -> Result<Vec<SnapshotResource>, BackendError> {
        let mut snapshots = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let request = match &next {
                None => {
                    let mut query = vec![("status", "available")];
                    if let Some(volume_id) = volume_id {
                        query.push(("volume_id", volume_id));
                    }
                    self.http
                        .get(self.endpoints.snapshots_detail())
                        .query(&query)
                }
                Some(href) => self.http.get(href),
            };
            let (response, _) = self.send(operation, request).await?;
            let page: SnapshotListResponse = response.json().await?;

            snapshots.extend(page.snapshots);
            next = next_link(&page.links);
            if next.is_none() {
                return Ok(snapshots);
            }
        }
    }

    /// Polls a snapshot until it reaches "available" or settles in a terminal failure state.
    ///
    /// The surrounding retry executor bounds this loop with the operation deadline.
    async fn wait_for_available(
        &self,
        snapshot_id: String,
    ) -> Result<SnapshotResource, BackendError> {
        const OPERATION: &str = "wait_for_snapshot_available";

        loop {
            let request = self.http.get(self.endpoints.snapshot(&snapshot_id));
            let (response, _) = self.send(OPERATION, request).await?;
            let envelope: SnapshotResponse = response.json().await?;

            match envelope.snapshot.status.as_str() {
                "available" => return Ok(envelope.snapshot),
                "error" | "error_deleting" => {
                    return Err(BackendError::SnapshotFailedState {
                        id: envelope.snapshot.id,
                        status: envelope.snapshot.status,
                    });
                }
                status => {
                    tracing::trace!(snapshot_id = %snapshot_id, status, "snapshot not yet available");
                    tokio::time::sleep(STATUS_POLL_INTERVAL).await;
                }
            }
        }
    }

    /// Sends an authenticated request and splits the response into success and error paths,
    /// extracting the backend's request-id trace header either way.
    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(Response, Option<String>), BackendError> {
        let response = request
            .header(AUTH_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        check_status(operation, response).await
    }
}

/// Builds the password-method token request for the profile.
fn auth_payload(profile: &CloudProfile) -> serde_json::Value {
    let auth = &profile.auth;
    let mut payload = serde_json::json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": auth.username,
                        "password": auth.password,
                        "domain": { "name": auth.user_domain_name },
                    }
                }
            }
        }
    });

    if let Some(project) = &auth.project_name {
        payload["auth"]["scope"] = serde_json::json!({
            "project": {
                "name": project,
                "domain": { "name": auth.project_domain_name },
            }
        });
    }

    payload
}

/// Picks the block-storage endpoint matching the profile's region and interface.
fn resolve_block_storage_endpoint(
    catalog: &[CatalogEntry],
    region: Option<&str>,
    interface: &str,
) -> Option<String> {
    catalog
        .iter()
        .filter(|entry| BLOCK_STORAGE_SERVICE_TYPES.contains(&entry.service_type.as_str()))
        .flat_map(|entry| entry.endpoints.iter())
        .find(|endpoint| {
            endpoint.interface == interface
                && region.map_or(true, |region| endpoint.region.as_deref() == Some(region))
        })
        .map(|endpoint| endpoint.url.trim_end_matches('/').to_string())
}

/// Shallow-merges `patch` into `existing`: patch keys overwrite, every other key survives.
fn merge_metadata(existing: &mut HashMap<String, String>, patch: &HashMap<String, String>) {
    existing.extend(patch.iter().map(|(key, value)| (key.clone(), value.clone())));
}

fn next_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel == "next")
        .map(|link| link.href.clone())
}

async fn check_status(
    operation: &'static str,
    response: Response,
) -> Result<(Response, Option<String>), BackendError> {
    let request_id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if response.status().is_success() {
        return Ok((response, request_id));
    }

    let status = response.status();
    let message: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(ERROR_BODY_LIMIT)
        .collect();
    Err(BackendError::Status {
        operation,
        status,
        message,
        request_id,
    })
}
