// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire-level request and response types for the identity and block-storage APIs.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use snapsentry_core::{SnapshotInfo, VolumeAttachment, VolumeInfo};

/// A catalog entry returned by the identity service.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    /// Service type, e.g. "volumev3" or "block-storage".
    #[serde(rename = "type")]
    pub service_type: String,
    /// Service name, informational.
    #[serde(default)]
    pub name: String,
    /// The endpoints offered for this service.
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// One endpoint of a catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    /// Endpoint interface: "public", "internal", or "admin".
    pub interface: String,
    /// The region the endpoint serves, when regionalised.
    #[serde(default)]
    pub region: Option<String>,
    /// The endpoint base URL.
    pub url: String,
}

/// The body of a successful token issue response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The token envelope.
    pub token: TokenBody,
}

/// The token envelope carrying the service catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBody {
    /// The service catalog; absent for unscoped tokens on some deployments.
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

/// A pagination link attached to a list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    /// Link relation; the follow-up page uses "next".
    pub rel: String,
    /// Absolute URL of the linked page.
    pub href: String,
}

/// A volume as returned by the block-storage API.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeResource {
    /// Opaque volume id.
    pub id: String,
    /// Volume display name; null for unnamed volumes.
    #[serde(default)]
    pub name: Option<String>,
    /// The volume's metadata map.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Current attachments.
    #[serde(default)]
    pub attachments: Vec<AttachmentResource>,
}

/// One attachment record of a volume.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentResource {
    /// The attached server's id; occasionally absent mid-detach.
    #[serde(default)]
    pub server_id: Option<String>,
}

/// A paginated volume listing.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeListResponse {
    /// The volumes on this page.
    pub volumes: Vec<VolumeResource>,
    /// Pagination links; empty on the final page.
    #[serde(default, rename = "volumes_links")]
    pub links: Vec<Link>,
}

/// A single-volume envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeResponse {
    /// The volume.
    pub volume: VolumeResource,
}

/// A snapshot as returned by the block-storage API.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResource {
    /// Opaque snapshot id.
    pub id: String,
    /// The source volume's id.
    pub volume_id: String,
    /// Lifecycle status, e.g. "creating", "available", "error".
    pub status: String,
    /// Creation timestamp.
    #[serde(deserialize_with = "deserialize_backend_timestamp")]
    pub created_at: DateTime<Utc>,
    /// The snapshot's metadata map.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A paginated snapshot listing.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotListResponse {
    /// The snapshots on this page, newest first.
    pub snapshots: Vec<SnapshotResource>,
    /// Pagination links; empty on the final page.
    #[serde(default, rename = "snapshots_links")]
    pub links: Vec<Link>,
}

/// A single-snapshot envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotResponse {
    /// The snapshot.
    pub snapshot: SnapshotResource,
}

/// Parses the backend's timestamp format.
///
/// The service emits naive microsecond timestamps in UTC ("2025-12-21T13:00:00.000000"); some
/// deployments include an explicit offset, so RFC 3339 is accepted as well.
fn deserialize_backend_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

impl From<VolumeResource> for VolumeInfo {
    fn from(volume: VolumeResource) -> Self {
        VolumeInfo {
            id: volume.id,
            name: volume.name.unwrap_or_default(),
            metadata: volume.metadata,
            attachments: volume
                .attachments
                .into_iter()
                .filter_map(|attachment| attachment.server_id)
                .map(|server_id| VolumeAttachment { server_id })
                .collect(),
        }
    }
}

impl From<SnapshotResource> for SnapshotInfo {
    fn from(snapshot: SnapshotResource) -> Self {
        SnapshotInfo {
            id: snapshot.id,
            volume_id: snapshot.volume_id,
            status: snapshot.status,
            created_at: snapshot.created_at,
            metadata: snapshot.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parses_a_naive_backend_timestamp() {
        let snapshot: SnapshotResource = serde_json::from_value(serde_json::json!({
            "id": "snap-1",
            "volume_id": "vol-1",
            "status": "available",
            "created_at": "2025-12-21T13:00:00.000000",
        }))
        .unwrap();
        assert_eq!(
            snapshot.created_at,
            Utc.with_ymd_and_hms(2025, 12, 21, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_an_rfc3339_timestamp() {
        let snapshot: SnapshotResource = serde_json::from_value(serde_json::json!({
            "id": "snap-1",
            "volume_id": "vol-1",
            "status": "available",
            "created_at": "2025-12-21T14:00:00+01:00",
        }))
        .unwrap();
        assert_eq!(
            snapshot.created_at,
            Utc.with_ymd_and_hms(2025, 12, 21, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn volume_conversion_drops_incomplete_attachments() {
        let volume: VolumeResource = serde_json::from_value(serde_json::json!({
            "id": "vol-1",
            "name": null,
            "attachments": [
                {"server_id": "vm-1"},
                {},
            ],
        }))
        .unwrap();

        let info = VolumeInfo::from(volume);
        assert_eq!(info.name, "");
        assert_eq!(info.attachments.len(), 1);
        assert_eq!(info.attachments[0].server_id, "vm-1");
    }
}
