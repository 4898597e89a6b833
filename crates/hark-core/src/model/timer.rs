use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HarkError, Result};

pub const MAX_LABEL_LENGTH: usize = 200;

/// Validate a requested timer length. Durations are stored as whole seconds
/// and must be strictly positive.
pub fn validate_duration(seconds: i64) -> Result<u32> {
    if seconds <= 0 {
        return Err(HarkError::InvalidInput(format!(
            "timer duration must be positive, got {seconds} seconds"
        )));
    }
    u32::try_from(seconds).map_err(|_| {
        HarkError::InvalidInput(format!(
            "timer duration of {seconds} seconds exceeds the maximum of {} seconds",
            u32::MAX
        ))
    })
}

/// Trim a label and collapse blank labels to `None`.
pub fn normalize_label(label: Option<&str>) -> Result<Option<String>> {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    if label.chars().count() > MAX_LABEL_LENGTH {
        return Err(HarkError::InvalidInput(format!(
            "label exceeds maximum length of {MAX_LABEL_LENGTH} characters"
        )));
    }
    Ok(Some(label.to_string()))
}

/// A persisted countdown. Records are created and deleted, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    pub id: i64,
    pub duration_seconds: u32,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TimerRecord {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(i64::from(self.duration_seconds))
    }

    /// Time left at `now`, or `None` once the timer has run out.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at() - now)
            .to_std()
            .ok()
            .filter(|d| !d.is_zero())
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now).is_some()
    }

    /// Project this record into the list view, if it is still running.
    pub fn active_at(&self, now: DateTime<Utc>) -> Option<ActiveTimer> {
        self.remaining_at(now).map(|remaining| ActiveTimer {
            id: self.id,
            remaining,
            label: self.label.clone(),
        })
    }
}

/// A running timer as reported by `list_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTimer {
    pub id: i64,
    pub remaining: Duration,
    pub label: Option<String>,
}

impl ActiveTimer {
    /// `mm:ss`, or `h:mm:ss` from one hour up.
    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining)
    }
}

/// Format a countdown, rounding partial seconds up so that a timer which is
/// still running never reads `00:00`.
pub fn format_remaining(remaining: Duration) -> String {
    let mut secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs += 1;
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
