// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Half-open window selection and the idempotent take/skip decision.
//!
//! All comparisons use the convention `[inclusive start, exclusive end)`; an instant equal to the
//! window start triggers a take when no prior snapshot covers the window.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

use crate::types::{EvaluationResult, PolicyWindow, SnapshotInfo};

/// Resolves a naive wall-clock time in the given zone.
///
/// A time that falls inside a DST spring-forward gap advances in one-hour steps until it exists;
/// an ambiguous time (fall-back) resolves to the earlier instant.
pub(crate) fn zoned(zone: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    use chrono::offset::LocalResult;

    let mut candidate = naive;
    for _ in 0..48 {
        match zone.from_local_datetime(&candidate) {
            LocalResult::Single(instant) => return instant,
            LocalResult::Ambiguous(earlier, _) => return earlier,
            LocalResult::None => candidate += Duration::hours(1),
        }
    }
    // Unreachable for real zone data; interpret the wall-clock time as UTC rather than panic.
    zone.from_utc_datetime(&naive)
}

/// Adds calendar days in the zone of `instant`, preserving the wall-clock time.
///
/// Unlike adding an absolute duration, this keeps e.g. a 14:00 expiry at 14:00 across DST
/// transitions.
pub(crate) fn add_days(instant: DateTime<Tz>, days: i64) -> DateTime<Tz> {
    let date = instant.date_naive() + Duration::days(days);
    zoned(instant.timezone(), date.and_time(instant.time()))
}

/// Decides whether a snapshot must be taken now.
///
/// `potential_start` is the schedule's tentative window start for the current cycle. When `now`
/// has not yet reached it, the window under evaluation is the one that just passed,
/// `[potential_start - duration, potential_start)`; this single rule produces the recovery /
/// catch-up behaviour for every schedule kind. Otherwise the window is
/// `[potential_start, potential_start + duration)`.
///
/// A take requires `now` to lie inside the window and no prior snapshot to have been created
/// within it.
pub(crate) fn evaluate_window(
    now: DateTime<Tz>,
    potential_start: DateTime<Tz>,
    duration: Duration,
    last_snapshot: Option<&SnapshotInfo>,
) -> EvaluationResult {
    let window = if now < potential_start {
        PolicyWindow {
            start: potential_start - duration,
            end: potential_start,
        }
    } else {
        PolicyWindow {
            start: potential_start,
            end: potential_start + duration,
        }
    };

    if !window.contains(now) {
        return EvaluationResult::skip(
            Some(window),
            format!(
                "current time {} is outside the active window {window}",
                now.to_rfc3339()
            ),
        );
    }

    if let Some(snapshot) = last_snapshot {
        let created_at = snapshot.created_at.with_timezone(&now.timezone());
        if window.contains(created_at) {
            return EvaluationResult::skip(
                Some(window),
                format!(
                    "snapshot {} created at {} already exists in the active window {window}",
                    snapshot.id,
                    created_at.to_rfc3339()
                ),
            );
        }
    }

    EvaluationResult::take(
        window,
        "window is active and no existing snapshot covers it".to_string(),
    )
}
