// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Errors raised while talking to the block-storage backend, and the retryability classifier.

use std::time::Duration;

use reqwest::StatusCode;

/// HTTP status codes that indicate a plausibly transient condition.
///
/// Malformed requests must not be re-sent, so every other status fails fast; transport failures
/// and rate limiting will plausibly succeed later.
const RETRIABLE_STATUS_CODES: [u16; 5] = [408, 429, 500, 503, 504];

/// Error raised during communication with the block-storage backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The service answered with a non-success HTTP status.
    #[error("{operation} returned HTTP {status}: {message}")]
    Status {
        /// The operation that observed the status.
        operation: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body, trimmed for logging.
        message: String,
        /// The backend's request-id trace header, when present.
        request_id: Option<String>,
    },

    /// A transport-level failure: connection reset, DNS, TLS, or body decoding.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The per-operation or caller deadline fired before an attempt could start.
    #[error("{operation} timed out before attempt {attempt}")]
    TimedOutBeforeAttempt {
        /// The operation that was about to run.
        operation: &'static str,
        /// The 1-based attempt that never started.
        attempt: u32,
    },

    /// The deadline fired while an attempt was in flight.
    #[error("{operation} exceeded its deadline after {elapsed:?}")]
    DeadlineExceeded {
        /// The operation that was cancelled.
        operation: &'static str,
        /// Time spent in the executor when the deadline fired.
        elapsed: Duration,
    },

    /// The deadline fired while sleeping between attempts.
    #[error("{operation} cancelled during backoff")]
    CancelledDuringBackoff {
        /// The operation that was waiting to retry.
        operation: &'static str,
    },

    /// Every attempt failed with a retriable error.
    #[error("{operation} failed after {retries} retries: {source}")]
    RetriesExhausted {
        /// The operation that kept failing.
        operation: &'static str,
        /// The number of retries that were attempted.
        retries: u32,
        /// The error from the final attempt.
        #[source]
        source: Box<BackendError>,
    },

    /// A snapshot settled in a terminal non-available status while we waited for it.
    #[error("snapshot {id} entered status '{status}' while waiting for 'available'")]
    SnapshotFailedState {
        /// The snapshot that failed.
        id: String,
        /// The status it settled in.
        status: String,
    },

    /// The identity service did not return a subject token.
    #[error("authentication succeeded but no subject token was returned")]
    MissingToken,

    /// The service catalog has no block-storage endpoint matching the profile.
    #[error("no block-storage endpoint for region '{region}' and interface '{interface}' in the service catalog")]
    MissingEndpoint {
        /// The region requested by the profile; empty when unconstrained.
        region: String,
        /// The endpoint interface requested by the profile.
        interface: String,
    },
}

impl BackendError {
    /// Returns the HTTP status code associated with the error, if any.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(source) => source.status(),
            Self::RetriesExhausted { source, .. } => source.http_status(),
            _ => None,
        }
    }

    /// Whether the error is transient and the operation may be re-attempted.
    ///
    /// Status-coded responses follow the classifier table; transport errors without a status are
    /// assumed transient. Everything else (deadline errors, terminal snapshot states, catalog
    /// and token problems) fails fast.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Status { status, .. } => RETRIABLE_STATUS_CODES.contains(&status.as_u16()),
            Self::Transport(source) => source
                .status()
                .map_or(true, |status| RETRIABLE_STATUS_CODES.contains(&status.as_u16())),
            _ => false,
        }
    }
}

/// Failure of a snapshot creation, carrying the best-known snapshot id.
///
/// The backend may have created the resource even though the call failed (for example when the
/// wait for "available" timed out or the snapshot settled in an error state). Callers must check
/// [`snapshot_id`][Self::snapshot_id] and delete the orphan when it is set.
#[derive(Debug, thiserror::Error)]
#[error("snapshot creation failed: {source}")]
pub struct CreateSnapshotError {
    /// The id of the partially created snapshot, when known.
    pub snapshot_id: Option<String>,
    /// The backend's request-id for the create call, when known.
    pub request_id: Option<String>,
    /// The underlying backend failure.
    #[source]
    pub source: BackendError,
}

#[cfg(test)]
mod tests {
    use snapsentry_test_utils::param_test;

    use super::*;

    fn status_error(code: u16) -> BackendError {
        BackendError::Status {
            operation: "test",
            status: StatusCode::from_u16(code).unwrap(),
            message: String::new(),
            request_id: None,
        }
    }

    param_test! {
        classifies_http_status_codes: [
            request_timeout: (408, true),
            too_many_requests: (429, true),
            internal_server_error: (500, true),
            service_unavailable: (503, true),
            gateway_timeout: (504, true),
            bad_request: (400, false),
            unauthorized: (401, false),
            forbidden: (403, false),
            not_found: (404, false),
            conflict: (409, false),
            not_implemented: (501, false),
            bad_gateway: (502, false),
        ]
    }
    fn classifies_http_status_codes(code: u16, retriable: bool) {
        assert_eq!(status_error(code).is_retriable(), retriable);
    }

    #[test]
    fn deadline_errors_are_not_retriable() {
        assert!(!BackendError::TimedOutBeforeAttempt {
            operation: "test",
            attempt: 1
        }
        .is_retriable());
        assert!(!BackendError::CancelledDuringBackoff { operation: "test" }.is_retriable());
    }

    #[test]
    fn terminal_snapshot_state_is_not_retriable() {
        // Re-running the create would spawn a second snapshot rather than fix the first.
        let error = BackendError::SnapshotFailedState {
            id: "snap-1".to_string(),
            status: "error".to_string(),
        };
        assert!(!error.is_retriable());
    }

    #[test]
    fn http_status_is_surfaced_through_exhaustion() {
        let error = BackendError::RetriesExhausted {
            operation: "test",
            retries: 3,
            source: Box::new(status_error(503)),
        };
        assert_eq!(error.http_status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }
}
