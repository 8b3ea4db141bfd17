//! Cross-cutting pieces every feature module leans on.

pub mod export;
pub mod middleware;
pub mod permissions;
pub mod reminders;

use chrono::{NaiveDateTime, Utc};

/// Timestamps are stored as naive UTC.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}
