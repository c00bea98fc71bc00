// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Outbound webhook for snapshot creation failures.

use std::time::Duration;

use serde::Serialize;
use snapsentry_core::PolicyWindow;

/// Error raised when a notification could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The request could not be sent.
    #[error("failed to send notification via webhook: {0}")]
    Transport(#[from] reqwest::Error),
    /// The webhook answered with a non-2xx status.
    #[error("webhook rejected the notification with HTTP {0}")]
    Rejected(reqwest::StatusCode),
}

/// The JSON payload posted on a snapshot creation failure.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotCreationFailure {
    /// Originating service identifier, always "snapsentry".
    pub service: &'static str,
    /// Name of the VM the volume is attached to, when known.
    pub virtual_machine_name: String,
    /// Id of the VM the volume is attached to, when known.
    pub virtual_machine_id: String,
    /// The volume whose snapshot failed.
    pub volume_id: String,
    /// The partially created snapshot, when one exists.
    pub snapshot_id: String,
    /// Human-readable failure description.
    pub message: String,
    /// The window the failed snapshot was meant to cover.
    pub snapshot_window: Option<PolicyWindow>,
}

/// A configured webhook target with optional HTTP basic authentication.
///
/// Delivery is fire-and-forget from the workflows' point of view: a non-2xx response is surfaced
/// as an error for logging but never retried.
#[derive(Debug, Clone)]
pub struct Webhook {
    url: String,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl Webhook {
    /// Creates a webhook pointing at `url`.
    pub fn new(url: String, username: Option<String>, password: Option<String>) -> Self {
        Self {
            url,
            username,
            password,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("a client with a static timeout always builds"),
        }
    }

    /// Posts the failure notification.
    pub async fn notify(&self, alert: &SnapshotCreationFailure) -> Result<(), NotificationError> {
        let mut request = self.http.post(&self.url).json(alert);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn payload_serializes_with_the_agreed_field_names() {
        let window_start = chrono_tz::UTC.with_ymd_and_hms(2025, 12, 21, 14, 0, 0).unwrap();
        let alert = SnapshotCreationFailure {
            service: "snapsentry",
            virtual_machine_name: String::new(),
            virtual_machine_id: "vm-1".to_string(),
            volume_id: "vol-1".to_string(),
            snapshot_id: "snap-1".to_string(),
            message: "creation failed".to_string(),
            snapshot_window: Some(PolicyWindow {
                start: window_start,
                end: window_start + chrono::Duration::hours(24),
            }),
        };

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["service"], "snapsentry");
        assert_eq!(value["virtual_machine_id"], "vm-1");
        assert_eq!(value["volume_id"], "vol-1");
        assert_eq!(value["snapshot_id"], "snap-1");
        assert!(value["snapshot_window"]["start"].is_string());
        assert!(value["snapshot_window"]["end"].is_string());
    }
}
