use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::db::Database;

pub const SCREEN_TIME_KEY: &str = "screenTimeSeconds";
pub const LAST_TICK_KEY: &str = "lastTick";

/// Seconds credited per minute tick while the browser is active.
pub const SECONDS_PER_TICK: u64 = 60;

impl Database {
    /// Creates the screen-time keys if this is a fresh store.
    pub async fn ensure_screen_time_keys(&self, now: DateTime<Utc>) -> Result<()> {
        let existing = self.get_items(&[SCREEN_TIME_KEY, LAST_TICK_KEY]).await?;
        let mut missing = Vec::new();
        if !existing.contains_key(SCREEN_TIME_KEY) {
            missing.push((SCREEN_TIME_KEY, Value::from(0u64)));
        }
        if !existing.contains_key(LAST_TICK_KEY) {
            missing.push((LAST_TICK_KEY, Value::from(now.timestamp_millis())));
        }
        if missing.is_empty() {
            return Ok(());
        }
        self.set_items(missing).await
    }

    pub async fn screen_time_seconds(&self) -> Result<u64> {
        let items = self.get_items(&[SCREEN_TIME_KEY]).await?;
        Ok(items
            .get(SCREEN_TIME_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    pub async fn last_tick_millis(&self) -> Result<Option<i64>> {
        let items = self.get_items(&[LAST_TICK_KEY]).await?;
        Ok(items.get(LAST_TICK_KEY).and_then(Value::as_i64))
    }

    /// Credits a minute when `active`; always advances `lastTick`.
    /// Returns the running total.
    pub async fn record_screen_time_tick(&self, active: bool, now: DateTime<Utc>) -> Result<u64> {
        let previous = self.screen_time_seconds().await?;
        let last_tick = (LAST_TICK_KEY, Value::from(now.timestamp_millis()));

        if !active {
            self.set_items(vec![last_tick]).await?;
            return Ok(previous);
        }

        let updated = previous.saturating_add(SECONDS_PER_TICK);
        self.set_items(vec![(SCREEN_TIME_KEY, Value::from(updated)), last_tick])
            .await?;
        Ok(updated)
    }

    pub async fn reset_screen_time(&self, now: DateTime<Utc>) -> Result<()> {
        self.set_items(vec![
            (SCREEN_TIME_KEY, Value::from(0u64)),
            (LAST_TICK_KEY, Value::from(now.timestamp_millis())),
        ])
        .await
    }
}
