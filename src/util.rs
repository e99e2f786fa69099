//! Shared utility functions.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Subscription;

pub const SECONDS_PER_DAY: i64 = 86400;

/// Current Unix timestamp in seconds.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

pub fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reject blank identifiers before they reach the store.
pub fn require_id(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// A subscription window computed for one spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionWindow {
    pub start_date: i64,
    pub end_date: i64,
}

impl SubscriptionWindow {
    /// Apply one extension of `days` to an existing subscription (or none).
    ///
    /// An active window grows from its current end; an expired or missing one
    /// restarts at `now`. Fails if the new end date does not fit in an `i64`.
    pub fn extend(existing: Option<&Subscription>, now: i64, days: i64) -> Result<Self> {
        let (start_date, base) = match existing {
            Some(sub) if sub.end_date > now => (sub.start_date, sub.end_date),
            _ => (now, now),
        };
        let end_date = days
            .checked_mul(SECONDS_PER_DAY)
            .and_then(|extension| base.checked_add(extension))
            .ok_or_else(|| {
                AppError::Validation(format!("Extending by {} days overflows the end date", days))
            })?;
        Ok(Self {
            start_date,
            end_date,
        })
    }
}
