//! Cumulative browsing time, periodic focus reminders and the daily reset.

pub mod controller;
pub mod loop_worker;

use chrono::{DateTime, Days, TimeZone};
use serde::{Deserialize, Serialize};

pub use controller::{ScreenTimeContext, ScreenTimeController};

/// Seconds past midnight at which the daily counter resets.
const DAILY_RESET_OFFSET_SECS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub title: String,
    pub text: String,
}

impl Reminder {
    pub fn after_minutes(minutes: u32) -> Self {
        Self {
            title: "Focus Reminder".to_string(),
            text: format!(
                "You've been browsing for {minutes} minutes. Take a deep breath or refocus on your task."
            ),
        }
    }
}

/// Reminders pause while focus mode is on and while the browser is in the
/// background.
pub fn reminder_for(focus_mode: bool, browser_active: bool, interval_minutes: u32) -> Option<Reminder> {
    if focus_mode || !browser_active {
        return None;
    }
    Some(Reminder::after_minutes(interval_minutes))
}

/// A few seconds after the next local midnight.
pub fn next_daily_reset<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let fallback = now.clone() + chrono::Duration::days(1);
    let Some(naive) = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|date| date.and_hms_opt(0, 0, DAILY_RESET_OFFSET_SECS))
    else {
        return fallback;
    };

    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or(fallback)
}
